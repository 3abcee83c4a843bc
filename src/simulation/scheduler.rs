//! Budget-aware cooperative scheduler
//!
//! Systems run in priority order once per tick. Non-skippable Systems always
//! run. A skippable System runs only when its predicted cost fits its slice
//! (waived after `max_deferred_ticks` deferrals in a row) and its worst-case
//! projection still fits in what is left of the usable frame. Every call is
//! wrapped by the `FaultMonitor` and timed with the injected `Clock`.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use serde::Serialize;

use crate::core::clock::Clock;
use crate::core::config::{BudgetConfig, FaultConfig};
use crate::core::error::CoreError;
use crate::core::types::Tick;
use crate::simulation::budget::BudgetSample;
use crate::simulation::fault::{FaultMonitor, InvokeOutcome};
use crate::simulation::snapshot::SystemMetrics;
use crate::simulation::system::{DataKind, System, SystemDescriptor};
use crate::simulation::world::World;

#[derive(Debug, Clone, Copy, Default)]
struct CostStats {
    runs: u64,
    deferrals: u64,
    consecutive_deferrals: u32,
    last: Duration,
    average: Duration,
    /// Decaying peak
    peak: Duration,
}

struct SystemSlot {
    system: Box<dyn System>,
    descriptor: SystemDescriptor,
    /// Manual switch; fault disablement is tracked by the monitor
    enabled: bool,
    stats: CostStats,
}

impl SystemSlot {
    fn predicted(&self) -> Duration {
        if self.stats.runs == 0 {
            self.descriptor.typical_cost
        } else {
            self.stats.average
        }
    }

    /// Cost assumed when checking what is left of the frame
    fn projection(&self) -> Duration {
        self.descriptor.worst_case_cost.max(self.stats.peak)
    }
}

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: Tick,
    pub ran: Vec<String>,
    pub deferred: Vec<String>,
    pub failed: Vec<String>,
    /// Disabled by the fault monitor during this tick
    pub disabled: Vec<String>,
    /// Skipped because they were disabled (manually or by faults)
    pub skipped: Vec<String>,
    /// Orders dropped from the mailboxes of skipped Systems
    pub discarded: usize,
    pub elapsed: Duration,
}

pub struct FrameScheduler {
    clock: Arc<dyn Clock>,
    config: BudgetConfig,
    slots: Vec<SystemSlot>,
    owners: AHashMap<DataKind, String>,
    faults: FaultMonitor,
}

impl FrameScheduler {
    pub fn new(clock: Arc<dyn Clock>, budget: BudgetConfig, faults: FaultConfig) -> Self {
        Self {
            clock,
            config: budget,
            slots: Vec::new(),
            owners: AHashMap::new(),
            faults: FaultMonitor::new(faults),
        }
    }

    /// Add a System
    ///
    /// Fails on a duplicate name or when a `DataKind` it writes already has
    /// an owner.
    pub fn register(&mut self, system: Box<dyn System>, world: &mut World) -> Result<(), CoreError> {
        let descriptor = system.descriptor();
        if self.slots.iter().any(|s| s.descriptor.name == descriptor.name) {
            return Err(CoreError::DuplicateSystem(descriptor.name));
        }
        for kind in &descriptor.writes {
            if let Some(owner) = self.owners.get(kind) {
                return Err(CoreError::OwnershipConflict {
                    kind: *kind,
                    owner: owner.clone(),
                    claimant: descriptor.name.clone(),
                });
            }
        }
        for kind in &descriptor.writes {
            self.owners.insert(*kind, descriptor.name.clone());
        }

        tracing::debug!(
            system = %descriptor.name,
            priority = descriptor.priority,
            skippable = descriptor.skippable,
            "registered system"
        );
        let name = descriptor.name.clone();
        self.slots.push(SystemSlot {
            system,
            descriptor,
            enabled: true,
            stats: CostStats::default(),
        });
        // Stable: equal priorities keep registration order
        self.slots.sort_by_key(|s| s.descriptor.priority);

        let samples = self.samples();
        if let Some(sample) = samples.iter().find(|s| s.name == name) {
            world.budget.register(*sample, &samples);
        }
        Ok(())
    }

    fn samples(&self) -> Vec<BudgetSample<'_>> {
        self.slots
            .iter()
            .map(|slot| BudgetSample {
                name: &slot.descriptor.name,
                predicted: slot.predicted(),
                weight: slot.descriptor.weight,
                skippable: slot.descriptor.skippable,
            })
            .collect()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), CoreError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.descriptor.name == name)
            .ok_or_else(|| CoreError::UnknownSystem(name.to_string()))?;
        slot.enabled = enabled;
        Ok(())
    }

    /// Registered System names in execution order
    pub fn order(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.descriptor.name.as_str()).collect()
    }

    pub fn owner_of(&self, kind: DataKind) -> Option<&str> {
        self.owners.get(&kind).map(String::as_str)
    }

    pub fn faults(&self) -> &FaultMonitor {
        &self.faults
    }

    pub fn faults_mut(&mut self) -> &mut FaultMonitor {
        &mut self.faults
    }

    /// Run every eligible System once and rebalance the budget
    pub fn run_tick(&mut self, world: &mut World, dt: f32) -> TickReport {
        let mut report = TickReport {
            tick: world.tick,
            ..TickReport::default()
        };
        let start = self.clock.now();
        let usable = world.budget.usable();
        let alpha = self.config.ema_alpha.clamp(f32::EPSILON, 1.0);

        for slot in &mut self.slots {
            let name = slot.descriptor.name.clone();
            let now = self.clock.now();
            if !slot.enabled || !self.faults.is_enabled(&name, now) {
                // Nothing else empties these while the System is off
                let dropped: usize = slot.descriptor.drains.iter().map(|&m| world.orders.discard(m)).sum();
                if dropped > 0 {
                    tracing::warn!(system = %name, tick = world.tick, dropped, "discarded orders for disabled system");
                    report.discarded += dropped;
                }
                report.skipped.push(name);
                continue;
            }

            if slot.descriptor.skippable {
                let elapsed = now.saturating_sub(start);
                let slice_ok = slot.predicted() <= world.budget.allocation(&name)
                    || slot.stats.consecutive_deferrals >= self.config.max_deferred_ticks;
                let frame_ok = elapsed + slot.projection() <= usable;
                if !(slice_ok && frame_ok) {
                    slot.stats.deferrals += 1;
                    slot.stats.consecutive_deferrals += 1;
                    tracing::debug!(
                        system = %name,
                        tick = world.tick,
                        slice_ok,
                        frame_ok,
                        "deferred system"
                    );
                    report.deferred.push(name);
                    continue;
                }
            }

            let system = &mut slot.system;
            let outcome = self.faults.invoke(&name, now, || system.update(world, dt));
            let cost = self.clock.now().saturating_sub(now);

            let stats = &mut slot.stats;
            stats.average = if stats.runs == 0 {
                cost
            } else {
                stats.average.mul_f32(1.0 - alpha) + cost.mul_f32(alpha)
            };
            stats.peak = cost.max(stats.peak.mul_f32(1.0 - alpha));
            stats.last = cost;
            stats.runs += 1;
            stats.consecutive_deferrals = 0;

            match outcome {
                InvokeOutcome::Completed => report.ran.push(name),
                InvokeOutcome::Failed { error, disabled } => {
                    tracing::debug!(system = %name, %error, "system failed");
                    if disabled {
                        report.disabled.push(name.clone());
                    }
                    report.failed.push(name);
                }
            }
        }

        report.elapsed = self.clock.now().saturating_sub(start);
        let samples = self.samples();
        world.budget.recompute(&samples, report.elapsed);
        report
    }

    pub fn metrics(&self, world: &World) -> Vec<SystemMetrics> {
        self.slots
            .iter()
            .map(|slot| {
                let name = &slot.descriptor.name;
                SystemMetrics {
                    name: name.clone(),
                    enabled: slot.enabled && !self.faults.is_disabled(name),
                    skippable: slot.descriptor.skippable,
                    allocation_us: world.budget.allocation(name).as_micros() as u64,
                    last_us: slot.stats.last.as_micros() as u64,
                    average_us: slot.stats.average.as_micros() as u64,
                    peak_us: slot.stats.peak.as_micros() as u64,
                    runs: slot.stats.runs,
                    deferrals: slot.stats.deferrals,
                    failures: self.faults.total_failures(name),
                    times_disabled: self.faults.times_disabled(name),
                }
            })
            .collect()
    }
}
