//! Horizon event mediator host
//!
//! Loads the mediator configuration, wires the scenario listeners and
//! drives simulated players through the engine until the scenario ends or
//! the process is interrupted.

use anyhow::Result;
use clap::Parser;
use horizon_event_mediator::{create_event_mediator, InMemoryPlayerDirectory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

mod config;
mod logging;
mod scenario;

use config::Args;
use scenario::Counters;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = Instant::now();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration before logging so the file can pick the level
    let config = config::load_config(&args).await?;

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("{e}");
        return Err(e);
    }

    info!("Starting Horizon event mediator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());
    info!(
        "Synchronization timeout {}s, sweep every {}ms",
        config.sync.timeout_secs, config.sync.sweep_interval_ms
    );

    let directory = Arc::new(InMemoryPlayerDirectory::new());
    let mediator = create_event_mediator(config, directory.clone());
    let counters = Counters::default();
    scenario::register_listeners(&mediator, &counters, args.vehicle_limit)?;
    mediator.start();
    info!("Startup complete in {:.2?}", startup_start.elapsed());

    let run = scenario::run(mediator.clone(), &directory, &counters, args.players, args.events);
    let report = tokio::select! {
        report = run => Some(report),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => warn!("Received Ctrl+C, stopping scenario"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            None
        }
    };

    mediator.stop();
    let stats = mediator.get_stats().await;

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!("Mediator shutdown complete");
    Ok(())
}
