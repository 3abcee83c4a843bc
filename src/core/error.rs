use thiserror::Error;

use crate::core::types::EntityHandle;
use crate::simulation::system::DataKind;

/// A stale, destroyed, or never-allocated entity reference
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid entity handle {0}")]
pub struct InvalidHandle(pub EntityHandle);

/// Failure returned from a System's per-tick entry point
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandle),

    #[error("system panicked: {0}")]
    Panicked(String),

    #[error("spatial index inconsistency: {0}")]
    SpatialIndexInconsistency(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpatialError {
    #[error("position ({x}, {y}) of {handle} is outside the indexed bounds")]
    OutOfBounds { handle: EntityHandle, x: f32, y: f32 },

    #[error("spatial index inconsistency: {0}")]
    Inconsistency(String),
}

impl From<SpatialError> for SystemError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::Inconsistency(detail) => SystemError::SpatialIndexInconsistency(detail),
            other => SystemError::Transient(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandle),

    #[error("system already registered: {0}")]
    DuplicateSystem(String),

    #[error("{kind:?} is owned by system {owner}, cannot also be claimed by {claimant}")]
    OwnershipConflict {
        kind: DataKind,
        owner: String,
        claimant: String,
    },

    #[error("unknown system: {0}")]
    UnknownSystem(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Spatial(#[from] SpatialError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
