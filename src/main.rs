//! Citadel Core - headless runner
//!
//! Populates a seeded world, runs it for a fixed number of ticks and prints
//! per-tick frame metrics, either as a one-line summary or as JSON lines.

use std::path::PathBuf;

use citadel_core::core::config::SimulationConfig;
use citadel_core::core::error::Result;
use citadel_core::simulation::scenario;
use citadel_core::simulation::{FrameMetrics, Simulation};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Headless simulation runner
#[derive(Parser, Debug)]
#[command(name = "citadel-core")]
#[command(about = "Run the simulation core headless and report frame metrics")]
struct Args {
    /// Number of ticks to run
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Worker units to spawn
    #[arg(long, default_value_t = 200)]
    units: usize,

    /// Resource nodes to scatter (defaults to a quarter of the units)
    #[arg(long)]
    nodes: Option<usize>,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print every tick's metrics as a JSON line
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("citadel_core=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut sim = Simulation::new(config)?;
    let nodes = args.nodes.unwrap_or(args.units / 4 + 1);
    scenario::populate(sim.world_mut(), args.units, nodes);

    tracing::info!(ticks = args.ticks, units = args.units, nodes, "starting run");

    let mut worst_us = 0;
    let mut total_us = 0;
    for _ in 0..args.ticks {
        let metrics = sim.tick();
        worst_us = worst_us.max(metrics.elapsed_us);
        total_us += metrics.elapsed_us;
        if args.json {
            println!("{}", serde_json::to_string(&metrics)?);
        } else if metrics.tick % 60 == 0 {
            print_summary(&metrics);
        }
    }

    let snapshot = sim.snapshots().latest();
    let average_us = total_us / args.ticks.max(1);
    tracing::info!(
        ticks = args.ticks,
        average_us,
        worst_us,
        treasury = snapshot.ui.treasury,
        entities = snapshot.ui.entities,
        "run complete"
    );
    Ok(())
}

fn print_summary(metrics: &FrameMetrics) {
    println!(
        "tick {:>6} | {:>6}us / {:>6}us | ran {} | deferred {:?} | failed {:?} | entities {} | paths {} ({} cached)",
        metrics.tick,
        metrics.elapsed_us,
        metrics.usable_us,
        metrics.ran,
        metrics.deferred,
        metrics.failed,
        metrics.entities,
        metrics.paths.requests,
        metrics.paths.cache_hits,
    );
}
