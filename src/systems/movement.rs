//! Path following
//!
//! Turns move orders into path requests, collects the answers and advances
//! units along their paths at `Mobile::speed`. Positions are committed here
//! and reach the spatial index at the next spatial sync.

use std::time::Duration;

use crate::core::error::SystemError;
use crate::core::types::{Cell, EntityHandle, Vec2};
use crate::ecs::components::{Mobile, Navigation, Selection, Transform};
use crate::pathfinding::{PathResult, TicketStatus};
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::{Mailbox, MoveOrder, World};

pub const NAME: &str = "movement";

#[derive(Debug, Default)]
pub struct MovementSystem;

impl MovementSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for MovementSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 40)
            .cost(Duration::from_micros(300), Duration::from_millis(3))
            .skippable(true)
            .weight(2.0)
            .writes(&[DataKind::Transform, DataKind::Mobile, DataKind::Navigation])
            .drains(&[Mailbox::Moves])
    }

    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), SystemError> {
        for order in std::mem::take(&mut world.orders.moves) {
            apply_order(world, order)?;
        }

        for handle in world.store.handles_with::<Navigation>() {
            let Ok(transform) = world.store.get::<Transform>(handle).copied() else {
                continue;
            };
            let speed = world.store.get::<Mobile>(handle).map_or(0.0, |m| m.speed);
            let current = world.store.get::<Navigation>(handle)?;
            let mut nav = current.clone();
            let mut position = transform.position;

            advance(world, handle, &mut nav, &mut position, speed * dt);

            if world.store.get::<Navigation>(handle)? != &nav {
                *world.store.get_mut::<Navigation>(handle)? = nav;
            }
            if position != transform.position {
                *world.store.get_mut::<Transform>(handle)? = Transform { position, previous: transform.position };
            } else if transform.previous != transform.position {
                // Stopped: stop interpolating from the last step
                world.store.get_mut::<Transform>(handle)?.previous = position;
            }
        }
        Ok(())
    }
}

fn apply_order(world: &mut World, order: MoveOrder) -> Result<(), SystemError> {
    match order {
        MoveOrder::Goto { handles, destination } => {
            let handles = if handles.is_empty() {
                world
                    .store
                    .query::<Selection>()
                    .filter(|(_, selection)| selection.selected)
                    .map(|(handle, _)| handle)
                    .collect()
            } else {
                handles
            };
            let goal = clamped_cell(world, destination);
            for handle in handles {
                if !world.store.has::<Mobile>(handle) || world.store.is_doomed(handle) {
                    continue;
                }
                let Some(position) = world.position(handle) else {
                    continue;
                };
                let start = world.cell_of(position);
                let ticket = world.pathfinder.request(handle, start, goal);
                *world.store.get_mut::<Navigation>(handle)? = Navigation::Awaiting { ticket, goal };
            }
        }
        MoveOrder::Follow { handle, path, goal } => {
            if let Ok(nav) = world.store.get_mut::<Navigation>(handle) {
                let next = usize::from(path.len() > 1);
                *nav = Navigation::Following { path, next, goal };
            }
        }
    }
    Ok(())
}

/// Grid cell for a world position, pulled inside the map
fn clamped_cell(world: &World, destination: Vec2) -> Cell {
    let cell = world.cell_of(destination);
    let max_x = world.terrain.width() as i32 - 1;
    let max_y = world.terrain.height() as i32 - 1;
    Cell::new(cell.x.clamp(0, max_x), cell.y.clamp(0, max_y))
}

fn advance(world: &mut World, handle: EntityHandle, nav: &mut Navigation, position: &mut Vec2, mut budget: f32) {
    if let Navigation::Awaiting { ticket, goal } = *nav {
        *nav = match world.pathfinder.status(ticket) {
            TicketStatus::Pending => return,
            TicketStatus::Unknown => Navigation::Idle,
            TicketStatus::Ready => match world.pathfinder.take(ticket) {
                Some(PathResult::Found(path)) => {
                    let next = usize::from(path.cells.len() > 1);
                    Navigation::Following { path: path.cells, next, goal }
                }
                Some(PathResult::NoPath) => Navigation::Stuck { goal },
                None => Navigation::Idle,
            },
        };
    }

    let Navigation::Following { path, next, goal } = nav else {
        return;
    };
    let epsilon = world.config.movement.waypoint_epsilon;

    while *next < path.len() && budget > 0.0 {
        let cell = path[*next];
        if !world.terrain.is_passable(cell) {
            let start = world.cell_of(*position);
            let goal = *goal;
            tracing::debug!(%handle, ?cell, "path blocked, re-planning");
            let ticket = world.pathfinder.request(handle, start, goal);
            *nav = Navigation::Awaiting { ticket, goal };
            return;
        }
        let waypoint = world.cell_center(cell);
        let distance = position.distance(&waypoint);
        if distance <= budget || distance <= epsilon {
            *position = waypoint;
            budget -= distance;
            *next += 1;
        } else {
            *position = *position + (waypoint - *position).normalize() * budget;
            budget = 0.0;
        }
    }
    *position = world.bounds().clamp(*position);

    if *next >= path.len() {
        *nav = Navigation::Idle;
    }
}
