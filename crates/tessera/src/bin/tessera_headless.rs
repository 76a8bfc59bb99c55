//! # Tessera Headless
//!
//! Runs the particle demo without a window and prints frame statistics.
//!
//! ```bash
//! # Default configuration, 600 frames
//! ./tessera_headless
//!
//! # Custom configuration and frame count
//! RUST_LOG=tessera=debug ./tessera_headless crates/tessera/config/simulation.toml 3600
//! ```

use std::process::ExitCode;
use std::time::Instant;

use tessera::demo::{self, CensusReport};
use tessera::{Simulation, SimulationConfig, SimulationResult};

const DEFAULT_FRAMES: u64 = 600;
const SEED: u64 = 0x7E55_E7A;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> SimulationResult<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    let frames = match args.next() {
        Some(count) => count.parse().map_err(|_| {
            tessera::SimulationError::InvalidConfig(format!("frame count must be a number, got {count:?}"))
        })?,
        None => DEFAULT_FRAMES,
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    TESSERA HEADLESS v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("  Frames:     {frames}");
    println!("  Fixed step: {:.4} s", config.simulation.fixed_timestep);
    println!("  Max steps:  {}", config.simulation.max_fixed_steps_per_frame);
    println!();

    let mut simulation = Simulation::from_builder(demo::builder(SEED), &config)?;
    simulation.load()?;

    // Simulated time, so runs are reproducible regardless of host speed.
    let delta = config.simulation.fixed_timestep;
    let started = Instant::now();
    for _ in 0..frames {
        simulation.update(delta)?;
    }
    let elapsed = started.elapsed();

    let report = *simulation.world().get_singleton::<CensusReport>()?;
    simulation.unload()?;

    println!("   ✓ Ran {frames} frames in {:.2?}", elapsed);
    println!(
        "   ✓ Particles: {} alive, {} moving, {} spawned, {} expired",
        report.alive, report.moving, report.spawned, report.expired
    );
    println!();
    simulation.stats().print_summary();
    Ok(())
}
