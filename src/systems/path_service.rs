//! Resolves queued path requests once per tick

use std::time::Duration;

use crate::core::error::SystemError;
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::World;

pub const NAME: &str = "path_service";

#[derive(Debug, Default)]
pub struct PathService;

impl PathService {
    pub fn new() -> Self {
        Self
    }
}

impl System for PathService {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 10)
            .cost(Duration::from_micros(300), Duration::from_millis(4))
            .writes(&[DataKind::PathRequests])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        let report = world.pathfinder.process(&world.terrain, world.tick);
        if report.flow_fields_built > 0 {
            tracing::debug!(
                tick = world.tick,
                fields = report.flow_fields_built,
                served = report.from_flow_field,
                "built flow fields"
            );
        }
        Ok(())
    }
}
