//! The tick loop
//!
//! One call to [`Simulation::tick`] does, in order:
//! boundary work (queued spawns and terrain edits, then drained intents),
//! the scheduler pass, the deletion step, metrics, and snapshot publication.

use std::sync::Arc;

use crate::core::clock::{Clock, MonotonicClock};
use crate::core::config::SimulationConfig;
use crate::core::error::Result;
use crate::pathfinding::CostGrid;
use crate::simulation::intents::{Intent, IntentQueue, IntentSender};
use crate::simulation::scheduler::{FrameScheduler, TickReport};
use crate::simulation::snapshot::{snapshot_channel, FrameMetrics, Snapshot, SnapshotReader, SnapshotWriter};
use crate::simulation::system::System;
use crate::simulation::world::{BuildOrder, MoveOrder, World};
use crate::systems;

pub struct Simulation {
    world: World,
    scheduler: FrameScheduler,
    intents: IntentQueue,
    writer: SnapshotWriter,
    reader: SnapshotReader,
    last_report: TickReport,
}

impl Simulation {
    /// Open terrain, wall clock, built-in Systems
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let world = World::new(config)?;
        Self::with_clock(world, Arc::new(MonotonicClock::new()))
    }

    pub fn with_terrain(config: SimulationConfig, terrain: CostGrid) -> Result<Self> {
        let world = World::with_terrain(config, terrain)?;
        Self::with_clock(world, Arc::new(MonotonicClock::new()))
    }

    /// Built-in Systems driven by a caller-supplied clock
    pub fn with_clock(world: World, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut sim = Self::empty(world, clock);
        systems::register_defaults(&mut sim.scheduler, &mut sim.world)?;
        Ok(sim)
    }

    /// No Systems registered; callers add their own
    pub fn empty(world: World, clock: Arc<dyn Clock>) -> Self {
        let scheduler = FrameScheduler::new(clock, world.config.budget.clone(), world.config.faults.clone());
        let (writer, reader) = snapshot_channel();
        Self {
            world,
            scheduler,
            intents: IntentQueue::new(),
            writer,
            reader,
            last_report: TickReport::default(),
        }
    }

    pub fn register(&mut self, system: Box<dyn System>) -> Result<()> {
        self.scheduler.register(system, &mut self.world)
    }

    pub fn intents(&self) -> IntentSender {
        self.intents.sender()
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.reader.clone()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler {
        &mut self.scheduler
    }

    /// Scheduler outcome of the most recent tick
    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Advance one tick and publish its snapshot
    pub fn tick(&mut self) -> FrameMetrics {
        self.apply_boundary();

        let dt = self.world.config.dt();
        let report = self.scheduler.run_tick(&mut self.world, dt);

        let per_tick = self.world.config.deletion.per_tick;
        let reclaimed = self.world.reclaim(per_tick).len();

        let metrics = self.frame_metrics(&report, reclaimed);
        self.writer.publish(Snapshot::capture(&self.world, metrics.clone()));
        self.last_report = report;
        self.world.tick += 1;
        metrics
    }

    /// Run `ticks` ticks, returning the metrics of the last one
    pub fn run(&mut self, ticks: u64) -> Option<FrameMetrics> {
        (0..ticks).map(|_| self.tick()).last()
    }

    fn apply_boundary(&mut self) {
        let world = &mut self.world;

        for (region, cost) in std::mem::take(&mut world.orders.terrain) {
            world.apply_terrain(region, cost);
        }
        for request in std::mem::take(&mut world.orders.spawns) {
            if world.spawn(request).is_none() {
                tracing::warn!(?request, "queued spawn outside the world");
            }
        }

        for intent in self.intents.drain() {
            match intent {
                Intent::Select(bounds) => world.orders.selections.push(bounds),
                Intent::Move { handles, destination } => {
                    world.orders.moves.push(MoveOrder::Goto { handles, destination });
                }
                Intent::Build { kind, cell } => world.orders.builds.push(BuildOrder { kind, cell }),
                Intent::Spawn(request) => {
                    if world.spawn(request).is_none() {
                        tracing::warn!(?request, "spawn rejected: position outside the world");
                    }
                }
                Intent::Destroy(handle) => {
                    if let Err(err) = world.store.destroy(handle) {
                        tracing::warn!(%err, "destroy ignored");
                    }
                }
                Intent::TerrainChanged { region, cost } => {
                    if world.apply_terrain(region, cost).is_none() {
                        tracing::warn!(?region, "terrain change outside the map");
                    }
                }
            }
        }
    }

    fn frame_metrics(&self, report: &TickReport, reclaimed: usize) -> FrameMetrics {
        let world = &self.world;
        FrameMetrics {
            tick: world.tick,
            elapsed_us: report.elapsed.as_micros() as u64,
            budget_us: world.budget.total().as_micros() as u64,
            usable_us: world.budget.usable().as_micros() as u64,
            allocated_us: world.budget.allocated().as_micros() as u64,
            systems: self.scheduler.metrics(world),
            ran: report.ran.len(),
            deferred: report.deferred.clone(),
            failed: report.failed.clone(),
            disabled: report.disabled.clone(),
            entities: world.store.len(),
            pending_deletions: world.store.pending_deletions(),
            reclaimed,
            spatial: world.spatial.stats(),
            spatial_rebuilds: world.spatial_rebuilds,
            paths: world.pathfinder.stats(),
        }
    }
}
