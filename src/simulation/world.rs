//! The explicit context handed to every System
//!
//! Everything a System may touch lives here: the entity store, the spatial
//! index, terrain and the path service, the frame budget, the seeded RNG and
//! the mailboxes Systems use to hand work to each other within a tick.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::config::SimulationConfig;
use crate::core::error::{ConfigError, InvalidHandle};
use crate::core::types::{Aabb, Cell, CellRect, EntityHandle, Tick, Vec2};
use crate::ecs::components::{Agent, Building, BuildingKind, Health, Mobile, Navigation, ResourceNode, Selection, Transform};
use crate::ecs::store::EntityStore;
use crate::pathfinding::{CostGrid, Pathfinder};
use crate::simulation::budget::FrameBudget;
use crate::simulation::intents::{SpawnKind, SpawnRequest};
use crate::simulation::snapshot::UiSummary;
use crate::spatial::SpatialIndex;

const WORKER_HEALTH: u32 = 100;

/// Work queued for the movement System
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOrder {
    /// Player order: path to `destination` (empty `handles` means the selection)
    Goto { handles: Vec<EntityHandle>, destination: Vec2 },
    /// AI order with a path the AI already obtained
    Follow { handle: EntityHandle, path: Vec<Cell>, goal: Cell },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOrder {
    pub kind: BuildingKind,
    pub cell: Cell,
}

/// Resource flow reported to the economy System
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EconomyEvent {
    Harvested { node: EntityHandle, amount: u32 },
    Delivered { amount: u32 },
}

/// Mailboxes drained by their owning System
#[derive(Debug, Default)]
pub struct Orders {
    pub selections: Vec<Aabb>,
    pub moves: Vec<MoveOrder>,
    pub builds: Vec<BuildOrder>,
    pub economy: Vec<EconomyEvent>,
    /// Entities to create at the next tick boundary
    pub spawns: Vec<SpawnRequest>,
    /// Terrain edits to apply at the next tick boundary
    pub terrain: Vec<(CellRect, u8)>,
}

/// The System-owned mailboxes in `Orders`
///
/// The boundary mailboxes (`spawns`, `terrain`) are drained by the tick
/// itself and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mailbox {
    Selections,
    Moves,
    Builds,
    Economy,
}

impl Orders {
    /// Drop everything waiting in `mailbox`; returns how many entries went
    pub fn discard(&mut self, mailbox: Mailbox) -> usize {
        match mailbox {
            Mailbox::Selections => std::mem::take(&mut self.selections).len(),
            Mailbox::Moves => std::mem::take(&mut self.moves).len(),
            Mailbox::Builds => std::mem::take(&mut self.builds).len(),
            Mailbox::Economy => std::mem::take(&mut self.economy).len(),
        }
    }
}

pub struct World {
    pub config: SimulationConfig,
    pub store: EntityStore,
    pub spatial: SpatialIndex,
    pub terrain: CostGrid,
    pub pathfinder: Pathfinder,
    pub budget: FrameBudget,
    pub rng: ChaCha8Rng,
    pub tick: Tick,
    pub orders: Orders,
    pub treasury: u64,
    pub ui: UiSummary,
    pub spatial_rebuilds: u64,
}

impl World {
    /// World with open terrain sized from the config
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        let terrain = CostGrid::new(
            config.world.width as usize,
            config.world.height as usize,
            config.world.cell_size,
        );
        Self::with_terrain(config, terrain)
    }

    pub fn with_terrain(config: SimulationConfig, terrain: CostGrid) -> Result<Self, ConfigError> {
        config.validate()?;
        if terrain.width() != config.world.width as usize || terrain.height() != config.world.height as usize {
            return Err(ConfigError::Invalid(format!(
                "terrain is {}x{} but world is {}x{}",
                terrain.width(),
                terrain.height(),
                config.world.width,
                config.world.height
            )));
        }
        Ok(Self {
            store: EntityStore::new(),
            spatial: SpatialIndex::new(config.world_bounds(), &config.spatial),
            pathfinder: Pathfinder::new(config.pathfinding.clone()),
            budget: FrameBudget::new(&config.budget),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            tick: 0,
            orders: Orders::default(),
            treasury: config.economy.starting_treasury,
            ui: UiSummary::default(),
            spatial_rebuilds: 0,
            terrain,
            config,
        })
    }

    pub fn bounds(&self) -> Aabb {
        self.spatial.bounds()
    }

    pub fn cell_of(&self, pos: Vec2) -> Cell {
        self.terrain.world_to_cell(pos)
    }

    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        self.terrain.cell_center(cell)
    }

    pub fn position(&self, handle: EntityHandle) -> Option<Vec2> {
        self.store.get::<Transform>(handle).ok().map(|t| t.position)
    }

    /// Create an entity with the components for `request`
    ///
    /// Positions outside the world are rejected before any slot is allocated.
    /// The spatial index picks the entity up during the next spatial sync.
    pub fn spawn(&mut self, request: SpawnRequest) -> Option<EntityHandle> {
        if !self.bounds().contains(request.position) {
            return None;
        }
        let handle = self.store.create();
        self.attach(handle, request).ok()?;
        Some(handle)
    }

    fn attach(&mut self, handle: EntityHandle, request: SpawnRequest) -> Result<(), InvalidHandle> {
        self.store.insert(handle, Transform::at(request.position))?;
        match request.kind {
            SpawnKind::Worker { home } => {
                let speed = self.config.movement.default_speed;
                self.store.insert(handle, Mobile { speed })?;
                self.store.insert(handle, Navigation::Idle)?;
                self.store.insert(handle, Selection::default())?;
                self.store.insert(handle, Health::full(WORKER_HEALTH))?;
                self.store.insert(handle, Agent::new(home.unwrap_or(request.position)))?;
            }
            SpawnKind::ResourceNode { amount } => {
                self.store.insert(handle, ResourceNode { remaining: amount })?;
            }
            SpawnKind::Structure { kind } => {
                let max = self.config.economy.structure_health;
                self.store.insert(handle, Building { kind, complete: false })?;
                self.store.insert(handle, Health { current: 1, max })?;
            }
        }
        Ok(())
    }

    /// The deletion step: reclaim up to `limit` queued entities
    ///
    /// Spatial entries and in-flight path requests go with the entity, in the
    /// same step that frees its slot.
    pub fn reclaim(&mut self, limit: usize) -> Vec<EntityHandle> {
        let reclaimed = self.store.reclaim(limit);
        for &handle in &reclaimed {
            self.spatial.remove(handle);
            self.pathfinder.cancel_owner(handle);
        }
        let backlog = self.store.pending_deletions();
        if backlog > 0 {
            tracing::debug!(reclaimed = reclaimed.len(), backlog, tick = self.tick, "deletion backlog");
        }
        reclaimed
    }

    /// Change terrain costs and invalidate paths that crossed the region
    pub fn apply_terrain(&mut self, region: CellRect, cost: u8) -> Option<CellRect> {
        let clipped = self.terrain.fill_region(region, cost)?;
        self.pathfinder.terrain_changed(clipped);
        Some(clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_spawn_worker_components() {
        let mut world = world();
        let worker = world
            .spawn(SpawnRequest { kind: SpawnKind::Worker { home: None }, position: Vec2::new(40.0, 40.0) })
            .unwrap();
        assert!(world.store.has::<Agent>(worker));
        assert!(world.store.has::<Mobile>(worker));
        assert_eq!(world.position(worker), Some(Vec2::new(40.0, 40.0)));
        assert_eq!(world.store.get::<Agent>(worker).unwrap().home, Vec2::new(40.0, 40.0));
    }

    #[test]
    fn test_spawn_out_of_bounds_rejected() {
        let mut world = world();
        let spawned =
            world.spawn(SpawnRequest { kind: SpawnKind::ResourceNode { amount: 10 }, position: Vec2::new(-5.0, 0.0) });
        assert_eq!(spawned, None);
        assert!(world.store.is_empty());
    }

    #[test]
    fn test_reclaim_removes_spatial_entry_and_request() {
        let mut world = world();
        let node = world
            .spawn(SpawnRequest { kind: SpawnKind::ResourceNode { amount: 10 }, position: Vec2::new(8.0, 8.0) })
            .unwrap();
        world.spatial.insert(node, Vec2::new(8.0, 8.0)).unwrap();
        world.pathfinder.request(node, Cell::new(0, 0), Cell::new(3, 3));
        world.store.destroy(node).unwrap();

        let reclaimed = world.reclaim(16);
        assert_eq!(reclaimed, vec![node]);
        assert!(!world.spatial.contains(node));
        assert_eq!(world.pathfinder.ticket_for(node), None);
    }

    #[test]
    fn test_terrain_size_must_match() {
        let err = World::with_terrain(SimulationConfig::default(), CostGrid::new(4, 4, 16.0));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        use rand::Rng;
        let mut a = world();
        let mut b = world();
        let xs: Vec<u32> = (0..4).map(|_| a.rng.gen()).collect();
        let ys: Vec<u32> = (0..4).map(|_| b.rng.gen()).collect();
        assert_eq!(xs, ys);
    }
}
