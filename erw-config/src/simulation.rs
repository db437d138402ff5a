//! Simulation run parameters.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Months simulated when no horizon is given.
pub const SIMULATION_MONTHS: usize = 120;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Number of forecast periods (months).
    #[serde(default = "default_horizon")]
    #[validate(range(min = 1, max = 1200))]
    pub horizon: usize,

    /// Number of parameter samples drawn from the posterior.
    #[serde(default = "default_sample_count")]
    #[validate(range(min = 1, max = 100000))]
    pub sample_count: usize,

    /// Seed for deterministic runs; a random seed is drawn and reported if unset.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Scale of the Gaussian jitter, grown with `sqrt(t)`.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1e6))]
    pub environmental_noise_scale: f64,

    /// Samples per unit of work; cancellation is checked between batches.
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 65536))]
    pub batch_size: usize,

    /// Worker threads.
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 1024))]
    pub workers: usize,
}

fn default_horizon() -> usize {
    SIMULATION_MONTHS
}

fn default_sample_count() -> usize {
    1000
}

fn default_batch_size() -> usize {
    256
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            sample_count: default_sample_count(),
            seed: None,
            environmental_noise_scale: 0.0,
            batch_size: default_batch_size(),
            workers: default_workers(),
        }
    }
}
