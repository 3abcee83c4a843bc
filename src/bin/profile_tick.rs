use std::time::Duration;

use citadel_core::core::config::SimulationConfig;
use citadel_core::simulation::{scenario, Simulation, SystemMetrics};

fn main() {
    let units = 10_000;
    println!("Profiling tick phases with {} workers\n", units);

    let mut config = SimulationConfig::default();
    config.world.width = 256;
    config.world.height = 256;
    let mut sim = match Simulation::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("failed to build simulation: {err}");
            std::process::exit(1);
        }
    };
    scenario::populate(sim.world_mut(), units, units / 10);

    // Warm up
    sim.run(5);

    let samples = 100;
    let mut total = Duration::ZERO;
    let mut deferred = 0;
    for _ in 0..samples {
        let metrics = sim.tick();
        total += Duration::from_micros(metrics.elapsed_us);
        deferred += metrics.deferred.len();
    }

    let systems = sim.scheduler().metrics(sim.world());
    println!("=== Per-system cost ({} samples) ===\n", samples);
    println!("System          | Last       | Average    | Peak       | Runs  | Deferred");
    println!("----------------|------------|------------|------------|-------|---------");
    for system in &systems {
        print_row(system);
    }
    println!("----------------|------------|------------|------------|-------|---------");
    println!("TOTAL (avg)     | {:>8.2?}", total / samples);
    println!("Deferred system runs: {}", deferred);
    println!("\nTarget: <16.6ms for 60 ticks/sec");
}

fn print_row(system: &SystemMetrics) {
    println!(
        "{:<15} | {:>8.2?} | {:>8.2?} | {:>8.2?} | {:>5} | {:>8}",
        system.name,
        Duration::from_micros(system.last_us),
        Duration::from_micros(system.average_us),
        Duration::from_micros(system.peak_us),
        system.runs,
        system.deferrals,
    );
}
