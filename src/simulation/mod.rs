//! Tick orchestration: scheduling, budgets, fault containment and the
//! surfaces the outside world talks to (intents in, snapshots out)

pub mod budget;
pub mod fault;
pub mod intents;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod system;
pub mod tick;
pub mod world;

pub use budget::{BudgetSample, FrameBudget};
pub use fault::{ErrorRecord, FaultEvent, FaultMonitor, InvokeOutcome};
pub use intents::{Intent, IntentQueue, IntentSender, SpawnKind, SpawnRequest};
pub use scheduler::{FrameScheduler, TickReport};
pub use snapshot::{
    snapshot_channel, EntityKind, EntitySnapshot, FrameMetrics, Snapshot, SnapshotReader, SnapshotWriter,
    SystemMetrics, UiSummary,
};
pub use system::{DataKind, System, SystemDescriptor};
pub use tick::Simulation;
pub use world::{BuildOrder, EconomyEvent, Mailbox, MoveOrder, Orders, World};
