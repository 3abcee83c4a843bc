//! Read-only per-tick output: entity snapshots, UI summary, and metrics
//!
//! The simulation publishes one `Arc<Snapshot>` per tick. Readers on other
//! threads clone the `Arc` and never block the tick for longer than a
//! pointer swap.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::core::types::{EntityHandle, Tick, Vec2};
use crate::ecs::components::{Agent, Building, BuildingKind, Health, ResourceNode, Selection, Transform};
use crate::pathfinding::PathStats;
use crate::simulation::world::World;
use crate::spatial::SpatialStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityKind {
    Worker,
    ResourceNode,
    Building(BuildingKind),
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub handle: EntityHandle,
    pub position: Vec2,
    /// Position before the last move, for render interpolation
    pub previous: Vec2,
    pub selected: bool,
    pub health: Option<Health>,
    pub kind: EntityKind,
}

impl EntitySnapshot {
    pub fn interpolate(&self, alpha: f32) -> Vec2 {
        self.previous.lerp(&self.position, alpha.clamp(0.0, 1.0))
    }
}

/// Derived counters for HUD-style consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiSummary {
    pub tick: Tick,
    pub entities: usize,
    pub selected: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub treasury: u64,
    pub buildings_complete: usize,
    pub buildings_in_progress: usize,
    pub resources_remaining: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub name: String,
    pub enabled: bool,
    pub skippable: bool,
    pub allocation_us: u64,
    pub last_us: u64,
    pub average_us: u64,
    pub peak_us: u64,
    pub runs: u64,
    pub deferrals: u64,
    pub failures: u64,
    pub times_disabled: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameMetrics {
    pub tick: Tick,
    pub elapsed_us: u64,
    pub budget_us: u64,
    pub usable_us: u64,
    pub allocated_us: u64,
    pub systems: Vec<SystemMetrics>,
    pub ran: usize,
    pub deferred: Vec<String>,
    pub failed: Vec<String>,
    pub disabled: Vec<String>,
    pub entities: usize,
    pub pending_deletions: usize,
    pub reclaimed: usize,
    pub spatial: SpatialStats,
    pub spatial_rebuilds: u64,
    pub paths: PathStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub tick: Tick,
    pub entities: Vec<EntitySnapshot>,
    pub ui: UiSummary,
    pub metrics: FrameMetrics,
}

impl Snapshot {
    /// Capture every active entity with a `Transform`
    pub fn capture(world: &World, metrics: FrameMetrics) -> Self {
        let store = &world.store;
        let entities = store
            .query::<Transform>()
            .map(|(handle, transform)| {
                let kind = if store.has::<Agent>(handle) {
                    EntityKind::Worker
                } else if store.has::<ResourceNode>(handle) {
                    EntityKind::ResourceNode
                } else if let Ok(building) = store.get::<Building>(handle) {
                    EntityKind::Building(building.kind)
                } else {
                    EntityKind::Other
                };
                EntitySnapshot {
                    handle,
                    position: transform.position,
                    previous: transform.previous,
                    selected: store.get::<Selection>(handle).is_ok_and(|s| s.selected),
                    health: store.get::<Health>(handle).ok().copied(),
                    kind,
                }
            })
            .collect();
        Self {
            tick: world.tick,
            entities,
            ui: world.ui.clone(),
            metrics,
        }
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.handle == handle)
    }
}

/// Publishing side, held by the simulation
#[derive(Debug)]
pub struct SnapshotWriter {
    slot: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotWriter {
    pub fn publish(&self, snapshot: Snapshot) {
        *self.slot.write() = Arc::new(snapshot);
    }
}

/// Cloneable read handle for renderers and tooling
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    slot: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.slot.read())
    }
}

pub fn snapshot_channel() -> (SnapshotWriter, SnapshotReader) {
    let slot = Arc::new(RwLock::new(Arc::new(Snapshot::default())));
    (SnapshotWriter { slot: Arc::clone(&slot) }, SnapshotReader { slot })
}
