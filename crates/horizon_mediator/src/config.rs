//! Command line arguments and configuration loading for the host.

use anyhow::{Context, Result};
use clap::Parser;
use horizon_event_mediator::MediatorConfig;
use std::path::PathBuf;

/// Command line arguments for the mediator host.
///
/// These arguments override configuration file settings and size the
/// soak scenario.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "mediator.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Number of simulated players
    #[arg(short, long, default_value_t = 8)]
    pub players: usize,

    /// Events raised per simulated player
    #[arg(short, long, default_value_t = 100)]
    pub events: usize,

    /// Vehicles the shared pool grants before vetoing further spawns
    #[arg(long, default_value_t = 4)]
    pub vehicle_limit: usize,
}

/// Loads the mediator configuration and applies command line overrides.
pub async fn load_config(args: &Args) -> Result<MediatorConfig> {
    let mut config = MediatorConfig::load_from_file(&args.config)
        .await
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut config, args);
    Ok(config)
}

pub fn apply_overrides(config: &mut MediatorConfig, args: &Args) {
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}
