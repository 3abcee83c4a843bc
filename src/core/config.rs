//! Simulation configuration
//!
//! Every tunable of the core lives here. Values are grouped per subsystem and
//! can be loaded from TOML; any key left out falls back to its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::types::Aabb;

/// Configuration for the simulation core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the world RNG; identical seeds and intents replay identically
    pub seed: u64,
    /// Simulation ticks per second (fixes `dt` handed to Systems)
    pub tick_rate: u32,
    pub world: WorldConfig,
    pub spatial: SpatialConfig,
    pub pathfinding: PathfindingConfig,
    pub budget: BudgetConfig,
    pub faults: FaultConfig,
    pub deletion: DeletionConfig,
    pub movement: MovementConfig,
    pub ai: AiConfig,
    pub economy: EconomyConfig,
}

/// Map dimensions; the terrain grid and spatial bounds derive from these
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Width in cells
    pub width: u32,
    /// Height in cells
    pub height: u32,
    /// Size of one cell in world units
    pub cell_size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Entries a leaf holds before it splits
    pub leaf_capacity: usize,
    /// Leaves at this depth never split
    pub max_depth: u32,
    /// A subtree holding fewer entries than this collapses into one leaf
    pub merge_threshold: usize,
    /// Ticks between full consistency checks against the entity store (0 = never)
    pub consistency_check_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    /// Maximum cached `(start, goal)` paths
    pub cache_capacity: usize,
    /// Requesters sharing a goal above which a flow field is built instead
    pub batch_threshold: usize,
    /// How long a flow field stays shareable, in ticks
    pub flow_field_ttl_ticks: u64,
    /// A* searches allowed per tick; the rest wait for the next tick
    pub max_searches_per_tick: usize,
    /// Independent searches in one tick above which they run on rayon
    pub parallel_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Total wall-clock target for one tick
    pub frame_budget_us: u64,
    /// Slice held back from adaptive reallocation
    pub reserved_us: u64,
    /// Slack below the target that counts as "comfortably under budget"
    pub safety_margin_us: u64,
    /// Smoothing factor for per-System cost averages (0, 1]
    pub ema_alpha: f32,
    /// Consecutive deferrals after which a skippable System's slice check is waived
    pub max_deferred_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Failures within `window_ms` that disable a System
    pub threshold: usize,
    pub window_ms: u64,
    /// Time a disabled System waits before it is retried
    pub cooldown_ms: u64,
    /// Error records kept per System
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    /// Maximum entities reclaimed per tick
    pub per_tick: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Speed used for spawned units that do not specify one (world units/second)
    pub default_speed: f32,
    /// Distance at which a waypoint counts as reached
    pub waypoint_epsilon: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub idle_jitter_ticks: u64,
    pub seek_timeout_ticks: u64,
    pub execute_timeout_ticks: u64,
    pub work_ticks: u64,
    pub return_timeout_ticks: u64,
    /// How far (world units) an agent looks for a resource node
    pub search_radius: f32,
    /// Distance from the target that counts as arrived
    pub arrival_radius: f32,
    /// Resources carried back per completed trip
    pub harvest_amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub starting_treasury: u64,
    pub depot_cost: u64,
    pub barracks_cost: u64,
    pub wall_cost: u64,
    /// Health a building under construction gains per tick
    pub construction_per_tick: u32,
    /// Health of a finished building; construction starts at 1
    pub structure_health: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            tick_rate: 20,
            world: WorldConfig::default(),
            spatial: SpatialConfig::default(),
            pathfinding: PathfindingConfig::default(),
            budget: BudgetConfig::default(),
            faults: FaultConfig::default(),
            deletion: DeletionConfig::default(),
            movement: MovementConfig::default(),
            ai: AiConfig::default(),
            economy: EconomyConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            cell_size: 16.0,
        }
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: 8,
            max_depth: 10,
            merge_threshold: 4,
            consistency_check_interval: 300,
        }
    }
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
            batch_threshold: 16,
            flow_field_ttl_ticks: 40,
            max_searches_per_tick: 256,
            parallel_threshold: 8,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            // 60 Hz frame
            frame_budget_us: 16_666,
            reserved_us: 2_000,
            safety_margin_us: 1_500,
            ema_alpha: 0.2,
            max_deferred_ticks: 8,
        }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            window_ms: 1_000,
            cooldown_ms: 5_000,
            history_len: 16,
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { per_tick: 256 }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            default_speed: 48.0,
            waypoint_epsilon: 0.5,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            idle_jitter_ticks: 10,
            seek_timeout_ticks: 60,
            execute_timeout_ticks: 600,
            work_ticks: 20,
            return_timeout_ticks: 600,
            search_radius: 512.0,
            arrival_radius: 12.0,
            harvest_amount: 5,
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_treasury: 500,
            depot_cost: 150,
            barracks_cost: 300,
            wall_cost: 40,
            construction_per_tick: 5,
            structure_health: 200,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Seconds per tick
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// World-space rectangle covered by the map
    pub fn world_bounds(&self) -> Aabb {
        Aabb::from_origin_size(
            0.0,
            0.0,
            self.world.width as f32 * self.world.cell_size,
            self.world.height as f32 * self.world.cell_size,
        )
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.tick_rate == 0 {
            return invalid("tick_rate must be positive".into());
        }
        if self.world.width == 0 || self.world.height == 0 || self.world.cell_size <= 0.0 {
            return invalid(format!(
                "world must have positive size, got {}x{} cells of {}",
                self.world.width, self.world.height, self.world.cell_size
            ));
        }
        if self.spatial.leaf_capacity == 0 {
            return invalid("spatial.leaf_capacity must be at least 1".into());
        }
        if self.spatial.merge_threshold > self.spatial.leaf_capacity {
            return invalid(format!(
                "spatial.merge_threshold ({}) must not exceed leaf_capacity ({})",
                self.spatial.merge_threshold, self.spatial.leaf_capacity
            ));
        }
        if self.spatial.max_depth > 24 {
            return invalid(format!("spatial.max_depth ({}) is deeper than 24", self.spatial.max_depth));
        }
        if self.budget.reserved_us >= self.budget.frame_budget_us {
            return invalid(format!(
                "budget.reserved_us ({}) must be below frame_budget_us ({})",
                self.budget.reserved_us, self.budget.frame_budget_us
            ));
        }
        if self.budget.safety_margin_us >= self.budget.frame_budget_us {
            return invalid("budget.safety_margin_us must be below frame_budget_us".into());
        }
        if !(self.budget.ema_alpha > 0.0 && self.budget.ema_alpha <= 1.0) {
            return invalid(format!("budget.ema_alpha ({}) must be in (0, 1]", self.budget.ema_alpha));
        }
        if self.faults.threshold == 0 || self.faults.history_len < self.faults.threshold {
            return invalid(format!(
                "faults.threshold ({}) must be positive and fit in history_len ({})",
                self.faults.threshold, self.faults.history_len
            ));
        }
        if self.deletion.per_tick == 0 {
            return invalid("deletion.per_tick must be at least 1".into());
        }
        if self.economy.structure_health == 0 {
            return invalid("economy.structure_health must be at least 1".into());
        }
        if self.pathfinding.max_searches_per_tick == 0 {
            return invalid("pathfinding.max_searches_per_tick must be at least 1".into());
        }
        Ok(())
    }
}

impl BudgetConfig {
    pub fn frame_budget(&self) -> Duration {
        Duration::from_micros(self.frame_budget_us)
    }

    pub fn reserved(&self) -> Duration {
        Duration::from_micros(self.reserved_us)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_micros(self.safety_margin_us)
    }
}

impl FaultConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
