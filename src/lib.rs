//! Citadel Core - deterministic tick-based simulation core
//!
//! Generational entity store, quad-tree spatial index, cached and batched
//! grid pathfinding, and a budget-aware scheduler that contains failing
//! Systems instead of letting them stall the tick.

pub mod core;
pub mod ecs;
pub mod pathfinding;
pub mod simulation;
pub mod spatial;
pub mod systems;
