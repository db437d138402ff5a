use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nalgebra::{Matrix2, Vector2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use erw_config::{ConfigError, ErwConfig, SimulationConfig};
use erw_core::prelude::*;
use erw_simulator::{aggregator, CancellationToken, SimulationEngine, SimulationReport};
use erw_telemetry::{MetricsRecorder, TracingSetup};

#[derive(Parser)]
#[command(name = "erw", version, about)]
pub struct Cli {
    /// Configuration file; defaults to `config/erw.yaml` plus `ERW_*` overrides.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr when done.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fold observations into a posterior
    Assimilate(AssimilateArgs),
    /// Forecast removal from an existing posterior
    Simulate(SimulateArgs),
    /// Assimilate observations, then forecast from the result
    Forecast(ForecastArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AssimilateArgs {
    /// Site configuration (YAML)
    #[arg(short, long)]
    pub site: PathBuf,
    /// Time-ordered observations (YAML list)
    #[arg(short, long)]
    pub observations: PathBuf,
    /// Starting posterior; the configured prior is used when omitted
    #[arg(short, long)]
    pub posterior: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunOverrides {
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub samples: Option<usize>,
    #[arg(long)]
    pub horizon: Option<usize>,
    /// Environmental noise scale
    #[arg(long)]
    pub noise: Option<f64>,
    /// Wall-clock budget after which the run is cancelled
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(short, long)]
    pub site: PathBuf,
    #[arg(short, long)]
    pub posterior: PathBuf,
    #[command(flatten)]
    pub run: RunOverrides,
}

#[derive(Args, Debug, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub assimilate: AssimilateArgs,
    #[command(flatten)]
    pub run: RunOverrides,
}

#[derive(Serialize)]
struct ForecastOutput {
    posterior: StatePosterior,
    log_likelihood: f64,
    report: SimulationReport,
}

pub fn run_command(cli: Cli, config: &ErwConfig, metrics: &MetricsRecorder) -> Result<()> {
    let output = match cli.command {
        Commands::Assimilate(args) => {
            let site: Configuration = read_yaml(&args.site)?;
            let assimilation = assimilate(&args, &site, config, metrics)?;
            serde_yaml::to_string(&assimilation.posterior)?
        }
        Commands::Simulate(args) => {
            let site: Configuration = read_yaml(&args.site)?;
            let posterior: StatePosterior = read_yaml(&args.posterior)?;
            let report = simulate(&posterior, &site, &args.run, config, metrics)?;
            serde_yaml::to_string(&report)?
        }
        Commands::Forecast(args) => {
            let site: Configuration = read_yaml(&args.assimilate.site)?;
            let assimilation = assimilate(&args.assimilate, &site, config, metrics)?;
            let report = simulate(&assimilation.posterior, &site, &args.run, config, metrics)?;
            serde_yaml::to_string(&ForecastOutput {
                posterior: assimilation.posterior,
                log_likelihood: assimilation.log_likelihood,
                report,
            })?
        }
    };
    print!("{output}");

    if cli.metrics {
        eprint!("{}", metrics.gather_metrics()?);
    }
    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn assimilate(
    args: &AssimilateArgs,
    site: &Configuration,
    config: &ErwConfig,
    metrics: &MetricsRecorder,
) -> Result<Assimilation> {
    let _span = TracingSetup::stage_span("assimilate", &site.config_id).entered();
    let estimator = StateEstimator::new(config.estimator.process_noise_rate)?;
    let prior = match &args.posterior {
        Some(path) => read_yaml::<StatePosterior>(path)?,
        None => estimator.initialize(
            Vector2::from(config.estimator.prior_mean),
            Matrix2::from_diagonal(&Vector2::from(config.estimator.prior_variance)),
        )?,
    };
    let observations: Vec<Observation> = read_yaml(&args.observations)?;

    let assimilation = estimator.assimilate(&prior, &observations)?;
    metrics.record_assimilation(observations.len());
    info!(
        observations = observations.len(),
        version = assimilation.posterior.version,
        "Posterior updated"
    );
    Ok(assimilation)
}

/// Applies command-line overrides and re-validates the merged settings.
fn run_config(defaults: &SimulationConfig, overrides: &RunOverrides) -> Result<SimulationConfig> {
    let merged = SimulationConfig {
        seed: overrides.seed.or(defaults.seed),
        sample_count: overrides.samples.unwrap_or(defaults.sample_count),
        horizon: overrides.horizon.unwrap_or(defaults.horizon),
        environmental_noise_scale: overrides.noise.unwrap_or(defaults.environmental_noise_scale),
        ..defaults.clone()
    };
    merged
        .validate()
        .map_err(ConfigError::from)
        .context("invalid simulation overrides")?;
    Ok(merged)
}

fn simulate(
    posterior: &StatePosterior,
    site: &Configuration,
    overrides: &RunOverrides,
    config: &ErwConfig,
    metrics: &MetricsRecorder,
) -> Result<SimulationReport> {
    let _span = TracingSetup::stage_span("simulate", &site.config_id).entered();
    let settings = run_config(&config.simulation, overrides)?;
    let token = match overrides.timeout_ms {
        Some(ms) => CancellationToken::with_budget(Duration::from_millis(ms)),
        None => CancellationToken::new(),
    };

    let started = Instant::now();
    let run = SimulationEngine::new(settings).run(posterior, site, &token)?;
    metrics.record_run(run.effective_sample_count, run.completed, started.elapsed());

    Ok(aggregator::report(&run, site)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_overrides() {
        let cli = Cli::try_parse_from([
            "erw",
            "simulate",
            "--site",
            "site.yaml",
            "--posterior",
            "posterior.yaml",
            "--seed",
            "42",
            "--samples",
            "500",
            "--timeout-ms",
            "1000",
        ])
        .unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.run.seed, Some(42));
        assert_eq!(args.run.samples, Some(500));
        assert_eq!(args.run.horizon, None);
        assert_eq!(args.run.timeout_ms, Some(1000));
    }

    #[test]
    fn overrides_are_validated_after_merging() {
        let defaults = SimulationConfig::default();
        let accepted = run_config(
            &defaults,
            &RunOverrides {
                samples: Some(500),
                horizon: Some(60),
                ..RunOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(accepted.sample_count, 500);
        assert_eq!(accepted.horizon, 60);
        assert_eq!(accepted.batch_size, defaults.batch_size);

        for overrides in [
            RunOverrides {
                samples: Some(200_000),
                ..RunOverrides::default()
            },
            RunOverrides {
                horizon: Some(0),
                ..RunOverrides::default()
            },
            RunOverrides {
                noise: Some(-1.0),
                ..RunOverrides::default()
            },
        ] {
            let err = run_config(&defaults, &overrides).unwrap_err();
            assert!(err.downcast_ref::<ConfigError>().is_some(), "{err:#}");
        }
    }

    #[test]
    fn forecast_accepts_global_config() {
        let cli = Cli::try_parse_from([
            "erw",
            "forecast",
            "-s",
            "site.yaml",
            "-o",
            "obs.yaml",
            "--horizon",
            "60",
            "--config",
            "custom.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        let Commands::Forecast(args) = cli.command else {
            panic!("expected forecast");
        };
        assert!(args.assimilate.posterior.is_none());
        assert_eq!(args.run.horizon, Some(60));
    }
}
