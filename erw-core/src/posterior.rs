//! Posterior snapshot over `[rate_constant, saturation_capacity]`.
//!
//! Snapshots are immutable values: the estimator takes one and returns a new
//! one with `version` bumped. Serializing writes per configuration is the
//! caller's job (a per-key lock or a transaction).

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::linalg;
use crate::model::{is_physical, RATE_CONSTANT, SATURATION_CAPACITY};

/// Prior mean used when a configuration has no posterior yet.
pub const DEFAULT_PRIOR_MEAN: [f64; 2] = [0.05, 50.0];
/// Prior variances (diagonal) paired with [`DEFAULT_PRIOR_MEAN`].
pub const DEFAULT_PRIOR_VARIANCE: [f64; 2] = [1e-3, 400.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePosterior {
    pub mean: Vector2<f64>,
    pub covariance: Matrix2<f64>,
    /// Number of observations folded in so far.
    pub observation_count: u64,
    /// Model time (months) the belief refers to.
    pub last_updated_at: f64,
    /// Incremented by every successful update.
    pub version: u64,
}

impl StatePosterior {
    /// Builds an unvalidated snapshot; use [`StatePosterior::check_invariants`]
    /// or `StateEstimator::initialize` before trusting it.
    pub fn new(mean: Vector2<f64>, covariance: Matrix2<f64>) -> Self {
        Self {
            mean,
            covariance,
            observation_count: 0,
            last_updated_at: 0.0,
            version: 0,
        }
    }

    pub fn default_prior() -> Self {
        Self::new(
            Vector2::from(DEFAULT_PRIOR_MEAN),
            Matrix2::from_diagonal(&Vector2::from(DEFAULT_PRIOR_VARIANCE)),
        )
    }

    pub fn rate_constant(&self) -> f64 {
        self.mean[RATE_CONSTANT]
    }

    pub fn saturation_capacity(&self) -> f64 {
        self.mean[SATURATION_CAPACITY]
    }

    /// Marginal standard deviations.
    pub fn std_dev(&self) -> Vector2<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }

    /// Positive finite mean, finite symmetric positive semi-definite
    /// covariance, and a non-negative model time.
    pub fn check_invariants(&self) -> EngineResult<()> {
        if !is_physical(&self.mean) {
            return Err(EngineError::InvalidState(format!(
                "posterior mean must be positive and finite, got [{}, {}]",
                self.mean[0], self.mean[1]
            )));
        }
        if !linalg::is_symmetric(&self.covariance) {
            return Err(EngineError::InvalidState(format!(
                "covariance is not symmetric: {:?}",
                self.covariance
            )));
        }
        if !linalg::is_positive_semi_definite(&self.covariance) {
            return Err(EngineError::InvalidState(format!(
                "covariance is not positive semi-definite (eigenvalues {:?})",
                linalg::eigenvalues(&self.covariance).as_slice()
            )));
        }
        if !(self.last_updated_at.is_finite() && self.last_updated_at >= 0.0) {
            return Err(EngineError::InvalidState(format!(
                "invalid model time {}",
                self.last_updated_at
            )));
        }
        Ok(())
    }
}
