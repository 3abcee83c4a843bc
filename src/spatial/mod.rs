//! Spatial partitioning

pub mod grid;
pub mod quadtree;

pub use grid::Grid;
pub use quadtree::{QueryRange, SpatialIndex, SpatialStats};
