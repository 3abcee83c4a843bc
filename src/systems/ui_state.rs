//! Derived UI counters, recomputed from scratch every tick it runs

use std::time::Duration;

use crate::core::error::SystemError;
use crate::ecs::components::{Agent, AiState, Building, ResourceNode, Selection};
use crate::simulation::snapshot::UiSummary;
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::World;

pub const NAME: &str = "ui_state";

#[derive(Debug, Default)]
pub struct UiStateSystem;

impl UiStateSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for UiStateSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 60)
            .cost(Duration::from_micros(40), Duration::from_micros(400))
            .skippable(true)
            .weight(0.5)
            .writes(&[DataKind::UiSummary])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        let store = &world.store;
        let (idle_workers, busy_workers) = store.query::<Agent>().fold((0, 0), |(idle, busy), (_, agent)| {
            if agent.state == AiState::Idle {
                (idle + 1, busy)
            } else {
                (idle, busy + 1)
            }
        });
        let (buildings_complete, buildings_in_progress) =
            store.query::<Building>().fold((0, 0), |(done, pending), (_, building)| {
                if building.complete {
                    (done + 1, pending)
                } else {
                    (done, pending + 1)
                }
            });

        world.ui = UiSummary {
            tick: world.tick,
            entities: store.active().count(),
            selected: store.query::<Selection>().filter(|(_, s)| s.selected).count(),
            idle_workers,
            busy_workers,
            treasury: world.treasury,
            buildings_complete,
            buildings_in_progress,
            resources_remaining: store.query::<ResourceNode>().map(|(_, n)| u64::from(n.remaining)).sum(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::types::Vec2;
    use crate::simulation::intents::{SpawnKind, SpawnRequest};

    #[test]
    fn test_summary_counts() {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        let worker = world
            .spawn(SpawnRequest { kind: SpawnKind::Worker { home: None }, position: Vec2::new(10.0, 10.0) })
            .unwrap();
        world.spawn(SpawnRequest { kind: SpawnKind::ResourceNode { amount: 30 }, position: Vec2::new(50.0, 10.0) });
        world.spawn(SpawnRequest { kind: SpawnKind::ResourceNode { amount: 12 }, position: Vec2::new(90.0, 10.0) });
        world.store.get_mut::<Selection>(worker).unwrap().selected = true;

        UiStateSystem::new().update(&mut world, 0.05).unwrap();
        let ui = &world.ui;
        assert_eq!(ui.entities, 3);
        assert_eq!(ui.selected, 1);
        assert_eq!(ui.idle_workers, 1);
        assert_eq!(ui.resources_remaining, 42);
        assert_eq!(ui.treasury, 500);
    }
}
