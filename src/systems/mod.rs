//! Built-in Systems, in default execution order

pub mod ai;
pub mod economy;
pub mod movement;
pub mod path_service;
pub mod selection;
pub mod spatial_sync;
pub mod ui_state;

pub use ai::{transition, AiEvent, AiSystem};
pub use economy::{building_cost, EconomySystem};
pub use movement::MovementSystem;
pub use path_service::PathService;
pub use selection::SelectionSystem;
pub use spatial_sync::SpatialSync;
pub use ui_state::UiStateSystem;

use crate::core::error::CoreError;
use crate::simulation::scheduler::FrameScheduler;
use crate::simulation::system::System;
use crate::simulation::world::World;

/// Every built-in System, unregistered
pub fn defaults() -> Vec<Box<dyn System>> {
    vec![
        Box::new(SpatialSync::new()),
        Box::new(PathService::new()),
        Box::new(SelectionSystem::new()),
        Box::new(AiSystem::new()),
        Box::new(MovementSystem::new()),
        Box::new(EconomySystem::new()),
        Box::new(UiStateSystem::new()),
    ]
}

pub fn register_defaults(scheduler: &mut FrameScheduler, world: &mut World) -> Result<(), CoreError> {
    for system in defaults() {
        scheduler.register(system, world)?;
    }
    Ok(())
}
