//! # erw Configuration System
//!
//! Layered runtime configuration for the weathering forecaster: estimator
//! tuning, simulation run parameters and telemetry.
//!
//! ## Features
//! - **Layered Sources**: defaults, YAML files and `ERW_*` environment variables
//! - **Validation**: every section is checked with `validator` after merging
//! - **Environment Awareness**: `ERW_ENV` selects an override file

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod estimator;
mod simulation;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use estimator::EstimatorConfig;
pub use simulation::{SimulationConfig, SIMULATION_MONTHS};
pub use telemetry::TelemetryConfig;

/// Base configuration file, relative to the working directory.
pub const BASE_CONFIG_PATH: &str = "config/erw.yaml";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct ErwConfig {
    /// Prior and process-noise settings for the state estimator.
    #[serde(default)]
    #[validate(nested)]
    pub estimator: EstimatorConfig,

    /// Monte Carlo run parameters.
    #[serde(default)]
    #[validate(nested)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl ErwConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/erw.yaml`, if present
    /// 3. `config/<ERW_ENV>.yaml`, if present
    /// 4. `ERW_*` environment variables (`__` separates sections)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ErwConfig::default()));

        if Path::new(BASE_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(BASE_CONFIG_PATH));
        }

        if let Ok(env) = std::env::var("ERW_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::extract(figment.merge(Env::prefixed("ERW_").split("__")))
    }

    /// Load configuration from a specific file, still honouring `ERW_*`
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(ErwConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("ERW_").split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn full_config_validation() {
        let config = ErwConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.set_env("ERW_SIMULATION__SAMPLE_COUNT", "2048");
            jail.set_env("ERW_SIMULATION__SEED", "7");
            let config = ErwConfig::load().expect("load");
            assert_eq!(config.simulation.sample_count, 2048);
            assert_eq!(config.simulation.seed, Some(7));
            Ok(())
        });
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                BASE_CONFIG_PATH,
                "simulation:\n  horizon: 60\n  environmental_noise_scale: 0.5\ntelemetry:\n  log_level: debug\n",
            )?;
            let config = ErwConfig::load().expect("load");
            assert_eq!(config.simulation.horizon, 60);
            assert_eq!(config.simulation.environmental_noise_scale, 0.5);
            assert_eq!(config.simulation.sample_count, 1000);
            assert_eq!(config.telemetry.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.yaml", "simulation:\n  horizon: 0\n")?;
            match ErwConfig::load_from_path("bad.yaml") {
                Err(err @ ConfigError::Validation(_)) => {
                    assert!(err.to_string().contains("horizon"));
                }
                other => panic!("expected validation error, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            ErwConfig::load_from_path("does/not/exist.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
