//! Component data types
//!
//! Components are plain data. Each one is written by exactly one System (see
//! `DataKind`); everything else only reads it.

use serde::{Deserialize, Serialize};

use crate::core::types::{Cell, EntityHandle, Tick, Vec2};
use crate::pathfinding::PathTicket;

/// Interpolatable position: renderers lerp from `previous` to `position`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Position at the start of the last tick that moved this entity
    pub previous: Vec2,
}

impl Transform {
    pub fn at(position: Vec2) -> Self {
        Self { position, previous: position }
    }

    pub fn interpolate(&self, alpha: f32) -> Vec2 {
        self.previous.lerp(&self.position, alpha.clamp(0.0, 1.0))
    }
}

/// Movement capability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mobile {
    /// World units per second
    pub speed: f32,
}

/// Path-following state, owned by the movement System
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Navigation {
    #[default]
    Idle,
    /// Waiting for the path service to answer
    Awaiting { ticket: PathTicket, goal: Cell },
    Following { path: Vec<Cell>, next: usize, goal: Cell },
    /// Goal unreachable or path blocked by a terrain change
    Stuck { goal: Cell },
}

impl Navigation {
    pub fn is_idle(&self) -> bool {
        matches!(self, Navigation::Idle)
    }

    pub fn goal(&self) -> Option<Cell> {
        match self {
            Navigation::Idle => None,
            Navigation::Awaiting { goal, .. }
            | Navigation::Following { goal, .. }
            | Navigation::Stuck { goal } => Some(*goal),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Health {
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn fraction(&self) -> f32 {
        if self.max == 0 {
            0.0
        } else {
            self.current as f32 / self.max as f32
        }
    }
}

/// A harvestable deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    Depot,
    Barracks,
    Wall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingKind,
    pub complete: bool,
}

/// AI states; see `systems::ai` for the transition table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiState {
    #[default]
    Idle,
    SeekingTarget,
    Executing,
    Returning,
    Complete,
}

/// Per-entity AI state, owned by the AI System
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub state: AiState,
    /// Tick at which the current state was entered
    pub entered_at: Tick,
    /// Where harvested resources are delivered
    pub home: Vec2,
    pub target: Option<EntityHandle>,
    pub ticket: Option<PathTicket>,
    pub carrying: u32,
    /// Idle agents do not look for work before this tick
    pub wake_at: Tick,
    /// Tick the current work started (Executing only)
    pub work_started: Option<Tick>,
}

impl Agent {
    pub fn new(home: Vec2) -> Self {
        Self {
            state: AiState::Idle,
            entered_at: 0,
            home,
            target: None,
            ticket: None,
            carrying: 0,
            wake_at: 0,
            work_started: None,
        }
    }
}
