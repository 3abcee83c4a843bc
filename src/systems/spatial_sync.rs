//! Position integration into the spatial index
//!
//! Runs first every tick so later Systems query committed positions.
//! Periodically cross-checks the tree against the store and rebuilds it when
//! they disagree.

use std::time::Duration;

use crate::core::error::{SpatialError, SystemError};
use crate::ecs::components::Transform;
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::World;

pub const NAME: &str = "spatial_sync";

#[derive(Debug, Default)]
pub struct SpatialSync;

impl SpatialSync {
    pub fn new() -> Self {
        Self
    }
}

impl System for SpatialSync {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 0)
            .cost(Duration::from_micros(150), Duration::from_millis(2))
            .writes(&[DataKind::SpatialIndex])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        let mut first_error: Option<SpatialError> = None;

        for index in world.store.drain_changed::<Transform>() {
            // Freed slots were already dropped from the index by reclamation
            let Some(handle) = world.store.handle_at(index) else {
                continue;
            };
            let result = match world.store.get::<Transform>(handle) {
                Ok(transform) => world.spatial.update(handle, transform.position),
                Err(_) => {
                    world.spatial.remove(handle);
                    Ok(())
                }
            };
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        let interval = world.config.spatial.consistency_check_interval;
        if interval > 0 && world.tick > 0 && world.tick % interval == 0 {
            if let Err(err) = world.spatial.validate_against(&world.store) {
                let rejected = world.spatial.rebuild_from_store(&world.store);
                world.spatial_rebuilds += 1;
                tracing::warn!(tick = world.tick, %err, rejected, "spatial index rebuilt");
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
