//! System trait and scheduling metadata

use std::time::Duration;

use serde::Serialize;

use crate::core::error::SystemError;
use crate::simulation::world::{Mailbox, World};

/// Data with a single writer
///
/// Every component column and shared resource is owned by exactly one
/// System. Registration fails if two Systems claim the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DataKind {
    Transform,
    Mobile,
    Navigation,
    Selection,
    Health,
    Agent,
    ResourceNode,
    Building,
    SpatialIndex,
    PathRequests,
    Treasury,
    UiSummary,
}

/// Static description of a System, read once at registration
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDescriptor {
    pub name: String,
    /// Lower runs earlier; ties keep registration order
    pub priority: i32,
    pub typical_cost: Duration,
    pub worst_case_cost: Duration,
    /// May be deferred when its slice or the frame is exhausted
    pub skippable: bool,
    /// Share of slack handed out during budget reallocation
    pub weight: f32,
    pub writes: Vec<DataKind>,
    /// Mailboxes only this System empties; discarded while it is disabled
    pub drains: Vec<Mailbox>,
}

impl SystemDescriptor {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            typical_cost: Duration::from_micros(100),
            worst_case_cost: Duration::from_millis(1),
            skippable: false,
            weight: 1.0,
            writes: Vec::new(),
            drains: Vec::new(),
        }
    }

    pub fn cost(mut self, typical: Duration, worst_case: Duration) -> Self {
        self.typical_cost = typical;
        self.worst_case_cost = worst_case.max(typical);
        self
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    pub fn weight(mut self, weight: f32) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    pub fn writes(mut self, kinds: &[DataKind]) -> Self {
        self.writes = kinds.to_vec();
        self
    }

    pub fn drains(mut self, mailboxes: &[Mailbox]) -> Self {
        self.drains = mailboxes.to_vec();
        self
    }
}

/// A unit of per-tick logic driven by the `FrameScheduler`
///
/// `update` must leave every entity either fully updated or untouched, so a
/// failure part way through a batch never exposes a half-written entity.
pub trait System {
    fn descriptor(&self) -> SystemDescriptor;

    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), SystemError>;
}
