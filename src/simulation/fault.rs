//! Fault containment for System calls
//!
//! Every System invocation goes through `FaultMonitor::invoke`. Returned
//! errors and panics both become `ErrorRecord`s; `threshold` records inside
//! the sliding `window` disable the System until `cooldown` has passed.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use ahash::AHashMap;
use serde::Serialize;

use crate::core::config::FaultConfig;
use crate::core::error::SystemError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Clock time of the failure
    pub at: Duration,
    pub detail: String,
}

/// State changes worth surfacing to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FaultEvent {
    SystemDisabled { name: String, until: Duration },
    SystemReenabled { name: String },
}

#[derive(Debug)]
pub enum InvokeOutcome {
    Completed,
    Failed { error: SystemError, disabled: bool },
}

impl InvokeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, InvokeOutcome::Completed)
    }
}

#[derive(Debug, Default)]
struct FaultHistory {
    records: VecDeque<ErrorRecord>,
    disabled_until: Option<Duration>,
    total_failures: u64,
    times_disabled: u64,
}

#[derive(Debug)]
pub struct FaultMonitor {
    config: FaultConfig,
    histories: AHashMap<String, FaultHistory>,
    events: Vec<FaultEvent>,
}

impl FaultMonitor {
    pub fn new(config: FaultConfig) -> Self {
        Self {
            config,
            histories: AHashMap::new(),
            events: Vec::new(),
        }
    }

    /// Run `f` as System `name`, recording failures
    pub fn invoke<F>(&mut self, name: &str, now: Duration, f: F) -> InvokeOutcome
    where
        F: FnOnce() -> Result<(), SystemError>,
    {
        let result = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(SystemError::Panicked(panic_message(payload.as_ref()))),
        };
        match result {
            Ok(()) => InvokeOutcome::Completed,
            Err(error) => {
                let disabled = self.record(name, now, error.to_string());
                InvokeOutcome::Failed { error, disabled }
            }
        }
    }

    /// Append a failure; returns true if this failure disabled the System
    pub fn record(&mut self, name: &str, now: Duration, detail: String) -> bool {
        let history = self.histories.entry(name.to_string()).or_default();
        history.total_failures += 1;
        history.records.push_back(ErrorRecord { at: now, detail });
        while history.records.len() > self.config.history_len.max(1) {
            history.records.pop_front();
        }

        if history.disabled_until.is_some() {
            return false;
        }
        let window_start = now.saturating_sub(self.config.window());
        let recent = history.records.iter().filter(|r| r.at >= window_start).count();
        if recent < self.config.threshold {
            return false;
        }

        let until = now + self.config.cooldown();
        history.disabled_until = Some(until);
        history.times_disabled += 1;
        tracing::warn!(
            system = name,
            failures = recent,
            cooldown_ms = self.config.cooldown_ms,
            "system disabled after repeated failures"
        );
        self.events.push(FaultEvent::SystemDisabled { name: name.to_string(), until });
        true
    }

    /// Whether `name` may run at `now`
    ///
    /// A System whose cooldown has elapsed is re-enabled here with a clean
    /// error history.
    pub fn is_enabled(&mut self, name: &str, now: Duration) -> bool {
        let Some(history) = self.histories.get_mut(name) else {
            return true;
        };
        match history.disabled_until {
            Some(until) if now >= until => {
                history.disabled_until = None;
                history.records.clear();
                tracing::info!(system = name, "system re-enabled after cooldown");
                self.events.push(FaultEvent::SystemReenabled { name: name.to_string() });
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.histories.get(name).is_some_and(|h| h.disabled_until.is_some())
    }

    pub fn history(&self, name: &str) -> impl Iterator<Item = &ErrorRecord> {
        self.histories.get(name).into_iter().flat_map(|h| h.records.iter())
    }

    pub fn total_failures(&self, name: &str) -> u64 {
        self.histories.get(name).map_or(0, |h| h.total_failures)
    }

    pub fn times_disabled(&self, name: &str) -> u64 {
        self.histories.get(name).map_or(0, |h| h.times_disabled)
    }

    /// Events since the last call
    pub fn take_events(&mut self) -> Vec<FaultEvent> {
        std::mem::take(&mut self.events)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
