//! Economic bookkeeping: treasury, resource depletion and construction

use std::time::Duration;

use crate::core::config::EconomyConfig;
use crate::core::error::SystemError;
use crate::core::types::CellRect;
use crate::ecs::components::{Building, BuildingKind, Health, ResourceNode};
use crate::pathfinding::BLOCKED;
use crate::simulation::intents::{SpawnKind, SpawnRequest};
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::{BuildOrder, EconomyEvent, Mailbox, World};

pub const NAME: &str = "economy";

pub fn building_cost(config: &EconomyConfig, kind: BuildingKind) -> u64 {
    match kind {
        BuildingKind::Depot => config.depot_cost,
        BuildingKind::Barracks => config.barracks_cost,
        BuildingKind::Wall => config.wall_cost,
    }
}

#[derive(Debug, Default)]
pub struct EconomySystem;

impl EconomySystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for EconomySystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 50)
            .cost(Duration::from_micros(80), Duration::from_micros(800))
            .skippable(true)
            .writes(&[DataKind::Health, DataKind::Building, DataKind::Treasury])
            .drains(&[Mailbox::Economy, Mailbox::Builds])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        for event in std::mem::take(&mut world.orders.economy) {
            match event {
                EconomyEvent::Harvested { node, amount } => {
                    // The harvest was already taken out of the node
                    let depleted = world.store.get::<ResourceNode>(node).is_ok_and(|n| n.remaining == 0);
                    if depleted && !world.store.is_doomed(node) {
                        world.store.destroy(node)?;
                        tracing::debug!(%node, amount, "resource node depleted");
                    }
                }
                EconomyEvent::Delivered { amount } => {
                    world.treasury = world.treasury.saturating_add(u64::from(amount));
                }
            }
        }

        for order in std::mem::take(&mut world.orders.builds) {
            place(world, order);
        }

        construct(world)
    }
}

fn place(world: &mut World, order: BuildOrder) {
    let cost = building_cost(&world.config.economy, order.kind);
    if !world.terrain.is_passable(order.cell) {
        tracing::debug!(cell = ?order.cell, kind = ?order.kind, "build site blocked");
        return;
    }
    if cost > world.treasury {
        tracing::debug!(cost, treasury = world.treasury, kind = ?order.kind, "cannot afford building");
        return;
    }
    world.treasury -= cost;
    world.orders.spawns.push(SpawnRequest {
        kind: SpawnKind::Structure { kind: order.kind },
        position: world.cell_center(order.cell),
    });
}

fn construct(world: &mut World) -> Result<(), SystemError> {
    let per_tick = world.config.economy.construction_per_tick;
    for handle in world.store.handles_with::<Building>() {
        let building = *world.store.get::<Building>(handle)?;
        if building.complete {
            continue;
        }
        let Ok(health) = world.store.get::<Health>(handle).copied() else {
            continue;
        };
        let current = health.current.saturating_add(per_tick).min(health.max);
        world.store.get_mut::<Health>(handle)?.current = current;
        if current < health.max {
            continue;
        }

        world.store.get_mut::<Building>(handle)?.complete = true;
        tracing::info!(%handle, kind = ?building.kind, tick = world.tick, "construction complete");
        if building.kind == BuildingKind::Wall {
            if let Some(position) = world.position(handle) {
                let cell = world.cell_of(position);
                world.orders.terrain.push((CellRect::single(cell), BLOCKED));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::types::{Cell, Vec2};

    fn world() -> World {
        World::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_delivery_adds_to_treasury() {
        let mut world = world();
        world.orders.economy.push(EconomyEvent::Delivered { amount: 25 });
        EconomySystem::new().update(&mut world, 0.05).unwrap();
        assert_eq!(world.treasury, 525);
    }

    #[test]
    fn test_depleted_node_is_destroyed() {
        let mut world = world();
        let node = world
            .spawn(SpawnRequest { kind: SpawnKind::ResourceNode { amount: 8 }, position: Vec2::new(40.0, 40.0) })
            .unwrap();
        let mut economy = EconomySystem::new();
        world.store.get_mut::<ResourceNode>(node).unwrap().remaining = 3;
        world.orders.economy.push(EconomyEvent::Harvested { node, amount: 5 });
        economy.update(&mut world, 0.05).unwrap();
        assert!(!world.store.is_doomed(node));
        assert_eq!(world.treasury, 500);

        // Two workers emptied it in the same tick
        world.store.get_mut::<ResourceNode>(node).unwrap().remaining = 0;
        world.orders.economy.push(EconomyEvent::Harvested { node, amount: 3 });
        world.orders.economy.push(EconomyEvent::Harvested { node, amount: 0 });
        economy.update(&mut world, 0.05).unwrap();
        assert!(world.store.is_doomed(node));
        assert_eq!(world.store.pending_deletions(), 1);
    }

    #[test]
    fn test_build_requires_funds() {
        let mut world = world();
        let mut economy = EconomySystem::new();
        world.orders.builds.push(BuildOrder { kind: BuildingKind::Barracks, cell: Cell::new(3, 3) });
        world.orders.builds.push(BuildOrder { kind: BuildingKind::Barracks, cell: Cell::new(6, 3) });
        economy.update(&mut world, 0.05).unwrap();
        // 500 buys one barracks at 300
        assert_eq!(world.treasury, 200);
        assert_eq!(world.orders.spawns.len(), 1);
        assert_eq!(world.orders.spawns[0].position, Vec2::new(56.0, 56.0));
    }

    #[test]
    fn test_build_rejects_blocked_cell() {
        let mut world = world();
        world.apply_terrain(CellRect::single(Cell::new(2, 2)), BLOCKED);
        world.orders.builds.push(BuildOrder { kind: BuildingKind::Wall, cell: Cell::new(2, 2) });
        EconomySystem::new().update(&mut world, 0.05).unwrap();
        assert_eq!(world.treasury, 500);
        assert!(world.orders.spawns.is_empty());
    }

    #[test]
    fn test_wall_completion_blocks_terrain() {
        let mut config = SimulationConfig::default();
        config.economy.structure_health = 10;
        let mut world = World::new(config).unwrap();
        let wall = world
            .spawn(SpawnRequest {
                kind: SpawnKind::Structure { kind: BuildingKind::Wall },
                position: Vec2::new(40.0, 40.0),
            })
            .unwrap();
        let mut economy = EconomySystem::new();
        economy.update(&mut world, 0.05).unwrap();
        assert!(!world.store.get::<Building>(wall).unwrap().complete);
        assert_eq!(world.store.get::<Health>(wall).unwrap().current, 6);

        economy.update(&mut world, 0.05).unwrap();
        assert!(world.store.get::<Building>(wall).unwrap().complete);
        assert_eq!(world.orders.terrain, vec![(CellRect::single(Cell::new(2, 2)), BLOCKED)]);
    }
}
