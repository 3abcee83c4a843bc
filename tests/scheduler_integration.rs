//! Scheduler budget and fault-containment integration tests

use std::sync::Arc;
use std::time::Duration;

use citadel_core::core::clock::ManualClock;
use citadel_core::core::config::SimulationConfig;
use citadel_core::core::error::SystemError;
use citadel_core::simulation::{FaultEvent, Simulation, System, SystemDescriptor, World};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Spends a random amount of simulated time between its typical and
/// worst-case cost
struct Bursty {
    descriptor: SystemDescriptor,
    clock: ManualClock,
    rng: ChaCha8Rng,
}

impl System for Bursty {
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn update(&mut self, _world: &mut World, _dt: f32) -> Result<(), SystemError> {
        let low = self.descriptor.typical_cost.as_micros() as u64;
        let high = self.descriptor.worst_case_cost.as_micros() as u64;
        self.clock.advance(Duration::from_micros(self.rng.gen_range(low..=high)));
        Ok(())
    }
}

enum Failure {
    Error,
    Panic,
}

struct Faulty {
    name: &'static str,
    clock: ManualClock,
    failure: Failure,
    calls: u32,
}

impl System for Faulty {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new(self.name, 20).skippable(true)
    }

    fn update(&mut self, _world: &mut World, _dt: f32) -> Result<(), SystemError> {
        self.calls += 1;
        self.clock.advance(Duration::from_micros(50));
        match self.failure {
            Failure::Error => Err(SystemError::Transient("always fails".into())),
            Failure::Panic => panic!("exploded on call {}", self.calls),
        }
    }
}

struct Healthy {
    clock: ManualClock,
}

impl System for Healthy {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("healthy", 10)
    }

    fn update(&mut self, _world: &mut World, _dt: f32) -> Result<(), SystemError> {
        self.clock.advance(Duration::from_micros(100));
        Ok(())
    }
}

fn simulation(clock: &ManualClock) -> Simulation {
    let world = World::new(SimulationConfig::default()).unwrap();
    Simulation::empty(world, Arc::new(clock.clone()))
}

fn bursty(name: &str, priority: i32, typical_us: u64, worst_us: u64, skippable: bool, clock: &ManualClock, seed: u64) -> Box<dyn System> {
    Box::new(Bursty {
        descriptor: SystemDescriptor::new(name, priority)
            .cost(Duration::from_micros(typical_us), Duration::from_micros(worst_us))
            .skippable(skippable)
            .weight(if skippable { 2.0 } else { 1.0 }),
        clock: clock.clone(),
        rng: ChaCha8Rng::seed_from_u64(seed),
    })
}

#[test]
fn test_bursts_stay_within_frame_budget() {
    let clock = ManualClock::new();
    let mut sim = simulation(&clock);
    sim.register(bursty("spatial", 0, 500, 3_000, false, &clock, 1)).unwrap();
    sim.register(bursty("paths", 10, 1_000, 6_000, false, &clock, 2)).unwrap();
    sim.register(bursty("ai", 30, 1_000, 5_000, true, &clock, 3)).unwrap();
    sim.register(bursty("movement", 40, 800, 3_000, true, &clock, 4)).unwrap();
    sim.register(bursty("ui", 60, 200, 1_500, true, &clock, 5)).unwrap();

    let budget = Duration::from_micros(SimulationConfig::default().budget.frame_budget_us);
    let epsilon = Duration::from_micros(1);
    let mut deferred = 0;

    for _ in 0..500 {
        let metrics = sim.tick();
        let report = sim.last_report();
        assert!(report.elapsed <= budget + epsilon, "tick {} took {:?}", metrics.tick, report.elapsed);
        assert!(metrics.allocated_us <= metrics.usable_us);
        // Non-skippable Systems run every tick
        assert!(report.ran.iter().any(|n| n == "spatial"));
        assert!(report.ran.iter().any(|n| n == "paths"));
        deferred += report.deferred.len();
    }
    assert!(deferred > 0, "bursts never forced a deferral");

    // Deferral is bounded: every skippable System still made progress
    let metrics = sim.scheduler().metrics(sim.world());
    for system in metrics.iter().filter(|s| s.skippable) {
        assert!(system.runs > 0, "{} never ran", system.name);
    }
}

#[test]
fn test_failing_system_disabled_then_reenabled() {
    let clock = ManualClock::new();
    let mut sim = simulation(&clock);
    let faults = SimulationConfig::default().faults;
    sim.register(Box::new(Healthy { clock: clock.clone() })).unwrap();
    sim.register(Box::new(Faulty { name: "broken", clock: clock.clone(), failure: Failure::Error, calls: 0 }))
        .unwrap();

    let frame = Duration::from_millis(16);
    let mut disabled_at = None;
    for tick in 0..faults.threshold as u64 {
        let metrics = sim.tick();
        clock.advance(frame);
        assert_eq!(metrics.failed, vec!["broken".to_string()]);
        if !metrics.disabled.is_empty() {
            disabled_at = Some(tick);
        }
    }
    assert_eq!(disabled_at, Some(faults.threshold as u64 - 1));

    // Cooling down: skipped, while the healthy System keeps running
    for _ in 0..10 {
        let metrics = sim.tick();
        clock.advance(frame);
        assert!(metrics.failed.is_empty());
        assert!(sim.last_report().skipped.contains(&"broken".to_string()));
        assert!(sim.last_report().ran.contains(&"healthy".to_string()));
    }

    clock.advance(faults.cooldown());
    let metrics = sim.tick();
    assert_eq!(metrics.failed, vec!["broken".to_string()]);
    let events = sim.scheduler_mut().faults_mut().take_events();
    assert!(matches!(events.as_slice(), [FaultEvent::SystemDisabled { .. }, FaultEvent::SystemReenabled { .. }]));
    assert_eq!(sim.scheduler().faults().times_disabled("broken"), 1);
}

#[test]
fn test_panicking_system_is_contained() {
    let clock = ManualClock::new();
    let mut sim = simulation(&clock);
    sim.register(Box::new(Healthy { clock: clock.clone() })).unwrap();
    sim.register(Box::new(Faulty { name: "panicky", clock: clock.clone(), failure: Failure::Panic, calls: 0 }))
        .unwrap();

    for _ in 0..5 {
        sim.tick();
        clock.advance(Duration::from_millis(16));
    }
    let faults = sim.scheduler().faults();
    assert!(faults.is_disabled("panicky"));
    assert!(faults.history("panicky").all(|record| record.detail.contains("exploded")));
    assert_eq!(sim.world().tick, 5);
}
