pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SimulationConfig;
pub use error::{CoreError, InvalidHandle, Result, SystemError};
pub use types::{Aabb, Cell, CellRect, EntityHandle, Tick, Vec2};
