//! State estimator tuning.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Random-walk variance added per month to `[k, C_max]`.
    #[serde(default = "default_process_noise_rate")]
    #[validate(custom(function = validation::validate_non_negative_pair))]
    pub process_noise_rate: [f64; 2],

    /// Prior mean used when a configuration has no posterior yet.
    #[serde(default = "default_prior_mean")]
    #[validate(custom(function = validation::validate_positive_pair))]
    pub prior_mean: [f64; 2],

    /// Prior variances (diagonal covariance).
    #[serde(default = "default_prior_variance")]
    #[validate(custom(function = validation::validate_positive_pair))]
    pub prior_variance: [f64; 2],
}

fn default_process_noise_rate() -> [f64; 2] {
    [1e-6, 1e-2]
}

fn default_prior_mean() -> [f64; 2] {
    [0.05, 50.0]
}

fn default_prior_variance() -> [f64; 2] {
    [1e-3, 400.0]
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            process_noise_rate: default_process_noise_rate(),
            prior_mean: default_prior_mean(),
            prior_variance: default_prior_variance(),
        }
    }
}
