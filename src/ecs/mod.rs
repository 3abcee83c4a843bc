//! Entity identity and component storage

pub mod components;
pub mod deletion;
pub mod store;

pub use components::{
    Agent, AiState, Building, BuildingKind, Health, Mobile, Navigation, ResourceNode, Selection,
    Transform,
};
pub use deletion::DeletionQueue;
pub use store::{Component, ComponentColumn, EntityStore};
