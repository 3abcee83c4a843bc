//! Box selection

use std::time::Duration;

use ahash::AHashSet;

use crate::core::error::SystemError;
use crate::core::types::EntityHandle;
use crate::ecs::components::Selection;
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::{Mailbox, World};

pub const NAME: &str = "selection";

#[derive(Debug, Default)]
pub struct SelectionSystem;

impl SelectionSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for SelectionSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 20)
            .cost(Duration::from_micros(50), Duration::from_micros(500))
            .skippable(true)
            .writes(&[DataKind::Selection])
            .drains(&[Mailbox::Selections])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        // Each box replaces the previous selection, so only the last one counts
        let Some(bounds) = std::mem::take(&mut world.orders.selections).pop() else {
            return Ok(());
        };

        let store = &world.store;
        let inside: AHashSet<EntityHandle> = world
            .spatial
            .query_range(bounds)
            .filter(|&h| store.has::<Selection>(h) && !store.is_doomed(h))
            .collect();

        for handle in world.store.handles_with::<Selection>() {
            let wanted = inside.contains(&handle);
            let current = world.store.get::<Selection>(handle)?.selected;
            if current != wanted {
                world.store.get_mut::<Selection>(handle)?.selected = wanted;
            }
        }
        Ok(())
    }
}
