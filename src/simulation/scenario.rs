//! Seeded starting layouts for the headless runner, profiling and tests

use rand::Rng;

use crate::core::types::Vec2;
use crate::simulation::intents::{SpawnKind, SpawnRequest};
use crate::simulation::world::World;

/// Resource node size used by [`populate`]
pub const NODE_AMOUNT: u32 = 200;

/// Scatter `workers` around a central home and `nodes` across the map
///
/// Positions come from the world's RNG, so the layout is a function of the
/// configured seed.
pub fn populate(world: &mut World, workers: usize, nodes: usize) -> usize {
    let bounds = world.bounds();
    let home = bounds.center();
    let spread = bounds.width().min(bounds.height()) * 0.1;
    let mut spawned = 0;

    for _ in 0..workers {
        let offset = Vec2::new(world.rng.gen_range(-spread..=spread), world.rng.gen_range(-spread..=spread));
        let request = SpawnRequest {
            kind: SpawnKind::Worker { home: Some(home) },
            position: bounds.clamp(home + offset),
        };
        spawned += usize::from(world.spawn(request).is_some());
    }
    for _ in 0..nodes {
        let position = Vec2::new(
            world.rng.gen_range(bounds.min.x..bounds.max.x),
            world.rng.gen_range(bounds.min.y..bounds.max.y),
        );
        let request = SpawnRequest { kind: SpawnKind::ResourceNode { amount: NODE_AMOUNT }, position };
        spawned += usize::from(world.spawn(request).is_some());
    }
    tracing::info!(workers, nodes, spawned, seed = world.config.seed, "populated world");
    spawned
}
