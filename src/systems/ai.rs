//! Worker AI: a table-driven state machine advanced one tick at a time
//!
//! Idle workers wake after a jittered delay, seek the nearest resource node,
//! work it, carry the harvest home and start over. Every state change goes
//! through [`transition`]; pairs missing from the table leave the state alone.
//!
//! A harvest is taken out of the node the moment it happens, so workers
//! finishing on the same node in one tick never carry more than it held.

use std::time::Duration;

use ahash::AHashSet;
use rand::Rng;

use crate::core::error::SystemError;
use crate::core::types::{EntityHandle, Tick, Vec2};
use crate::ecs::components::{Agent, AiState, Navigation, ResourceNode};
use crate::pathfinding::{PathResult, PathTicket, TicketStatus};
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::{EconomyEvent, MoveOrder, World};

pub const NAME: &str = "ai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiEvent {
    Begin,
    PathFound,
    NoPath,
    Arrived,
    WorkDone,
    Timeout,
    TargetLost,
    Reset,
}

use AiEvent::*;
use AiState::*;

const TRANSITIONS: &[(AiState, AiEvent, AiState)] = &[
    (Idle, Begin, SeekingTarget),
    (SeekingTarget, PathFound, Executing),
    (SeekingTarget, NoPath, Idle),
    (SeekingTarget, TargetLost, Idle),
    (SeekingTarget, Timeout, Idle),
    (SeekingTarget, Reset, Idle),
    (Executing, WorkDone, Returning),
    (Executing, TargetLost, Idle),
    (Executing, Timeout, Idle),
    (Executing, Reset, Idle),
    (Returning, Arrived, Complete),
    (Returning, NoPath, Idle),
    (Returning, Timeout, Idle),
    (Returning, Reset, Idle),
    (Complete, Reset, Idle),
];

/// Next state for `event`, or `None` when the table has no such edge
pub fn transition(state: AiState, event: AiEvent) -> Option<AiState> {
    TRANSITIONS
        .iter()
        .find(|(from, on, _)| *from == state && *on == event)
        .map(|(_, _, to)| *to)
}

#[derive(Debug, Default)]
pub struct AiSystem;

impl AiSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for AiSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(NAME, 30)
            .cost(Duration::from_micros(400), Duration::from_millis(3))
            .skippable(true)
            .weight(3.0)
            .writes(&[DataKind::Agent, DataKind::ResourceNode])
    }

    fn update(&mut self, world: &mut World, _dt: f32) -> Result<(), SystemError> {
        // Entities whose move order has not reached the movement System yet
        let mut queued: AHashSet<EntityHandle> = world
            .orders
            .moves
            .iter()
            .filter_map(|order| match order {
                MoveOrder::Follow { handle, .. } => Some(*handle),
                MoveOrder::Goto { .. } => None,
            })
            .collect();

        for handle in world.store.handles_with::<Agent>() {
            let Some(position) = world.position(handle) else {
                continue;
            };
            let current = world.store.get::<Agent>(handle)?;
            let mut agent = current.clone();

            if let Some(event) = decide(world, handle, position, &mut agent, &mut queued) {
                match transition(agent.state, event) {
                    Some(next) => enter(world, &mut agent, next),
                    None => tracing::trace!(%handle, state = ?agent.state, ?event, "ignored event"),
                }
            }

            if world.store.get::<Agent>(handle)? != &agent {
                *world.store.get_mut::<Agent>(handle)? = agent;
            }
        }
        Ok(())
    }
}

fn timed_out(entered_at: Tick, now: Tick, limit: u64) -> bool {
    now.saturating_sub(entered_at) > limit
}

/// Per-state work for one tick; returns the event to feed the table
fn decide(
    world: &mut World,
    handle: EntityHandle,
    position: Vec2,
    agent: &mut Agent,
    queued: &mut AHashSet<EntityHandle>,
) -> Option<AiEvent> {
    let tick = world.tick;
    let ai = world.config.ai.clone();

    match agent.state {
        Idle => {
            let free = world.store.get::<Navigation>(handle).map_or(true, Navigation::is_idle);
            (tick >= agent.wake_at && free).then_some(Begin)
        }
        SeekingTarget => {
            if timed_out(agent.entered_at, tick, ai.seek_timeout_ticks) {
                return Some(Timeout);
            }
            let target = match agent.target.filter(|&t| node_available(world, t)) {
                Some(target) => target,
                None => {
                    let found = nearest_node(world, position, ai.search_radius)?;
                    agent.target = Some(found);
                    agent.ticket = None;
                    found
                }
            };
            let target_pos = world.position(target)?;

            let Some(ticket) = agent.ticket else {
                let (start, goal) = (world.cell_of(position), world.cell_of(target_pos));
                agent.ticket = Some(world.pathfinder.request(handle, start, goal));
                return None;
            };
            match collect(world, ticket) {
                Collected::Waiting => None,
                Collected::Lost => Some(TargetLost),
                Collected::Result(PathResult::NoPath) => Some(NoPath),
                Collected::Result(PathResult::Found(path)) => {
                    agent.ticket = None;
                    let goal = world.cell_of(target_pos);
                    world.orders.moves.push(MoveOrder::Follow { handle, path: path.cells, goal });
                    queued.insert(handle);
                    Some(PathFound)
                }
            }
        }
        Executing => {
            if timed_out(agent.entered_at, tick, ai.execute_timeout_ticks) {
                return Some(Timeout);
            }
            let Some(target) = agent.target.filter(|&t| node_available(world, t)) else {
                return Some(TargetLost);
            };
            let target_pos = world.position(target)?;

            if position.distance(&target_pos) > ai.arrival_radius {
                // Movement gave up or was redirected before reaching the node
                return (!queued.contains(&handle) && !is_moving(world, handle)).then_some(TargetLost);
            }

            let started = *agent.work_started.get_or_insert(tick);
            if tick.saturating_sub(started) < ai.work_ticks {
                return None;
            }
            let Ok(deposit) = world.store.get_mut::<ResourceNode>(target) else {
                return Some(TargetLost);
            };
            let amount = ai.harvest_amount.min(deposit.remaining);
            if amount == 0 {
                return Some(TargetLost);
            }
            deposit.remaining -= amount;
            agent.carrying = amount;
            world.orders.economy.push(EconomyEvent::Harvested { node: target, amount });

            let (start, goal) = (world.cell_of(position), world.cell_of(agent.home));
            agent.ticket = Some(world.pathfinder.request(handle, start, goal));
            Some(WorkDone)
        }
        Returning => {
            if timed_out(agent.entered_at, tick, ai.return_timeout_ticks) {
                return Some(Timeout);
            }
            if let Some(ticket) = agent.ticket {
                return match collect(world, ticket) {
                    Collected::Waiting => None,
                    Collected::Lost | Collected::Result(PathResult::NoPath) => Some(NoPath),
                    Collected::Result(PathResult::Found(path)) => {
                        agent.ticket = None;
                        let goal = world.cell_of(agent.home);
                        world.orders.moves.push(MoveOrder::Follow { handle, path: path.cells, goal });
                        queued.insert(handle);
                        None
                    }
                };
            }

            if position.distance(&agent.home) <= ai.arrival_radius {
                world.orders.economy.push(EconomyEvent::Delivered { amount: agent.carrying });
                agent.carrying = 0;
                return Some(Arrived);
            }
            (!queued.contains(&handle) && !is_moving(world, handle)).then_some(NoPath)
        }
        Complete => Some(Reset),
    }
}

/// Entry actions, run on every state change
fn enter(world: &mut World, agent: &mut Agent, next: AiState) {
    agent.state = next;
    agent.entered_at = world.tick;
    if next == Idle {
        if let Some(ticket) = agent.ticket.take() {
            world.pathfinder.cancel(ticket);
        }
        agent.target = None;
        agent.work_started = None;
        agent.carrying = 0;
        let jitter = world.config.ai.idle_jitter_ticks;
        agent.wake_at = world.tick + world.rng.gen_range(0..=jitter);
    }
}

enum Collected {
    Waiting,
    /// Cancelled, usually because the same entity was given another order
    Lost,
    Result(PathResult),
}

fn collect(world: &mut World, ticket: PathTicket) -> Collected {
    match world.pathfinder.status(ticket) {
        TicketStatus::Pending => Collected::Waiting,
        TicketStatus::Unknown => Collected::Lost,
        TicketStatus::Ready => match world.pathfinder.take(ticket) {
            Some(result) => Collected::Result(result),
            None => Collected::Lost,
        },
    }
}

fn node_available(world: &World, node: EntityHandle) -> bool {
    world.store.get::<ResourceNode>(node).is_ok_and(|n| n.remaining > 0) && !world.store.is_doomed(node)
}

fn nearest_node(world: &World, position: Vec2, radius: f32) -> Option<EntityHandle> {
    world
        .spatial
        .query_nearest_where(position, 1, radius, |h| node_available(world, h))
        .first()
        .map(|(handle, _)| *handle)
}

fn is_moving(world: &World, handle: EntityHandle) -> bool {
    matches!(
        world.store.get::<Navigation>(handle),
        Ok(Navigation::Awaiting { .. } | Navigation::Following { .. })
    )
}
