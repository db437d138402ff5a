//! ## erw-cli
//! **Command-line front end for the forecast engine**
//!
//! Reads site configurations, observations and posteriors as YAML and
//! prints updated posteriors and forecast reports as YAML.

use anyhow::{Context, Result};
use clap::Parser;

use erw_config::ErwConfig;
use erw_telemetry::{MetricsRecorder, TracingSetup};

mod commands;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ErwConfig::load_from_path(path),
        None => ErwConfig::load(),
    }
    .context("failed to load configuration")?;

    TracingSetup::init(&config.telemetry.log_level)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")?;
    let metrics = MetricsRecorder::new().context("failed to register metrics")?;

    commands::run_command(cli, &config, &metrics)
}
