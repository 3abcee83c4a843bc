//! Grid pathfinding: A*, path cache, flow fields, and the request service

pub mod astar;
pub mod cache;
pub mod cost_grid;
pub mod flow_field;
pub mod service;

pub use astar::{find_path, Path, PathResult, SearchScratch};
pub use cache::{CacheStats, PathCache};
pub use cost_grid::{CostGrid, BLOCKED, DIAGONAL_STEP, ORTHOGONAL_STEP};
pub use flow_field::FlowField;
pub use service::{PathStats, PathTicket, Pathfinder, ProcessReport, TicketStatus};
