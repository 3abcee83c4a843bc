//! Per-tick time budget and its adaptive reallocation
//!
//! The usable budget is `total - reserved`. After every tick the allocations
//! are recomputed from what the Systems actually cost, and the sum of all
//! allocations is clamped back under the usable budget every time.

use std::time::Duration;

use ahash::AHashMap;

use crate::core::config::BudgetConfig;

/// One System's input to a budget recomputation
#[derive(Debug, Clone, Copy)]
pub struct BudgetSample<'a> {
    pub name: &'a str,
    /// Smoothed cost estimate
    pub predicted: Duration,
    pub weight: f32,
    pub skippable: bool,
}

#[derive(Debug, Clone)]
pub struct FrameBudget {
    total: Duration,
    reserved: Duration,
    safety_margin: Duration,
    allocations: AHashMap<String, Duration>,
}

impl FrameBudget {
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            total: config.frame_budget(),
            reserved: config.reserved().min(config.frame_budget()),
            safety_margin: config.safety_margin(),
            allocations: AHashMap::new(),
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn reserved(&self) -> Duration {
        self.reserved
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Time available to Systems
    pub fn usable(&self) -> Duration {
        self.total.saturating_sub(self.reserved)
    }

    pub fn allocation(&self, name: &str) -> Duration {
        self.allocations.get(name).copied().unwrap_or_default()
    }

    pub fn allocated(&self) -> Duration {
        self.allocations.values().sum()
    }

    /// Seed a newly registered System with its declared typical cost
    pub fn register(&mut self, sample: BudgetSample<'_>, all: &[BudgetSample<'_>]) {
        self.allocations.insert(sample.name.to_string(), sample.predicted);
        self.enforce_ceiling(all);
    }

    /// Reallocate after a tick that consumed `measured` in total
    ///
    /// Comfortably under target: every System gets its predicted cost plus a
    /// weighted share of the remaining usable time. Over target: the overrun
    /// is taken out of skippable allocations first, then non-skippable ones.
    pub fn recompute(&mut self, samples: &[BudgetSample<'_>], measured: Duration) {
        self.allocations
            .retain(|name, _| samples.iter().any(|s| s.name == name.as_str()));

        if measured + self.safety_margin <= self.total {
            let base: Duration = samples.iter().map(|s| s.predicted).sum();
            let slack = self.usable().saturating_sub(base);
            // Weights in thousandths so the split is exact integer arithmetic
            let weights: Vec<u128> = samples.iter().map(|s| (s.weight * 1000.0).round() as u128).collect();
            let weight_sum: u128 = weights.iter().sum();
            for (sample, weight) in samples.iter().zip(weights) {
                let share_ns = if weight_sum > 0 {
                    slack.as_nanos() * weight / weight_sum
                } else {
                    slack.as_nanos() / samples.len() as u128
                };
                let allocation = sample.predicted + Duration::from_nanos(share_ns as u64);
                self.allocations.insert(sample.name.to_string(), allocation);
            }
        } else if measured > self.total {
            let overrun = measured - self.total;
            let remaining = self.shrink(samples, overrun, true);
            self.shrink(samples, remaining, false);
        }

        self.enforce_ceiling(samples);
    }

    /// Σ allocations ≤ usable, trimming skippable Systems first
    fn enforce_ceiling(&mut self, samples: &[BudgetSample<'_>]) {
        let usable = self.usable();
        let allocated = self.allocated();
        if allocated <= usable {
            return;
        }
        let remaining = self.shrink(samples, allocated - usable, true);
        let remaining = self.shrink(samples, remaining, false);
        if !remaining.is_zero() {
            // Allocations of Systems not in `samples`; drop them outright
            let known: Vec<String> = samples.iter().map(|s| s.name.to_string()).collect();
            self.allocations.retain(|name, _| known.contains(name));
        }
    }

    /// Remove up to `amount` from the allocations of one group, proportionally
    /// to their size. Returns what could not be removed.
    fn shrink(&mut self, samples: &[BudgetSample<'_>], amount: Duration, skippable: bool) -> Duration {
        if amount.is_zero() {
            return amount;
        }
        let group: Vec<&str> = samples
            .iter()
            .filter(|s| s.skippable == skippable)
            .map(|s| s.name)
            .collect();
        let available: Duration = group.iter().map(|name| self.allocation(name)).sum();
        if available.is_zero() {
            return amount;
        }
        let take = amount.min(available);
        let (take_ns, available_ns) = (take.as_nanos(), available.as_nanos());
        for name in group {
            if let Some(allocation) = self.allocations.get_mut(name) {
                let current = allocation.as_nanos();
                // Round up so the group gives back at least `take` in total
                let cut = (take_ns * current).div_ceil(available_ns).min(current);
                *allocation = Duration::from_nanos((current - cut) as u64);
            }
        }
        amount - take
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BudgetConfig {
        BudgetConfig {
            frame_budget_us: 10_000,
            reserved_us: 2_000,
            safety_margin_us: 1_000,
            ema_alpha: 0.2,
            max_deferred_ticks: 4,
        }
    }

    fn us(v: u64) -> Duration {
        Duration::from_micros(v)
    }

    fn samples() -> Vec<BudgetSample<'static>> {
        vec![
            BudgetSample { name: "spatial", predicted: us(1_000), weight: 1.0, skippable: false },
            BudgetSample { name: "ai", predicted: us(2_000), weight: 3.0, skippable: true },
            BudgetSample { name: "ui", predicted: us(500), weight: 1.0, skippable: true },
        ]
    }

    #[test]
    fn test_slack_distributed_by_weight() {
        let mut budget = FrameBudget::new(&config());
        budget.recompute(&samples(), us(3_500));
        // usable 8000, base 3500, slack 4500 split 1:3:1
        assert_eq!(budget.allocation("spatial"), us(1_000 + 900));
        assert_eq!(budget.allocation("ai"), us(2_000 + 2_700));
        assert_eq!(budget.allocation("ui"), us(500 + 900));
        assert!(budget.allocated() <= budget.usable());
    }

    #[test]
    fn test_overrun_shrinks_skippable_first() {
        let mut budget = FrameBudget::new(&config());
        budget.recompute(&samples(), us(3_500));
        let spatial_before = budget.allocation("spatial");
        budget.recompute(&samples(), us(12_000));
        // 2000 overrun fits within the skippable allocations (6100)
        assert_eq!(budget.allocation("spatial"), spatial_before);
        assert!(budget.allocation("ai") + budget.allocation("ui") <= us(4_100));
    }

    #[test]
    fn test_overrun_reaches_non_skippable() {
        let mut budget = FrameBudget::new(&config());
        budget.recompute(&samples(), us(3_500));
        budget.recompute(&samples(), us(17_000));
        assert_eq!(budget.allocation("ai"), Duration::ZERO);
        assert_eq!(budget.allocation("ui"), Duration::ZERO);
        assert!(budget.allocation("spatial") < us(1_900));
    }

    #[test]
    fn test_ceiling_holds_when_predictions_exceed_budget() {
        let mut budget = FrameBudget::new(&config());
        let heavy = vec![
            BudgetSample { name: "a", predicted: us(6_000), weight: 1.0, skippable: false },
            BudgetSample { name: "b", predicted: us(7_000), weight: 1.0, skippable: true },
        ];
        for sample in &heavy {
            budget.register(*sample, &heavy);
        }
        assert!(budget.allocated() <= budget.usable());
        budget.recompute(&heavy, us(9_500));
        assert!(budget.allocated() <= budget.usable());
        assert_eq!(budget.allocation("a"), us(6_000));
    }
}
