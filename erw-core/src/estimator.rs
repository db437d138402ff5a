//! ## erw-core::estimator
//! **Extended Kalman recursion over the uptake parameters**
//!
//! Each observation is folded in by a `predict` (random-walk drift of the
//! parameters for the elapsed model time) followed by an `update` that
//! linearizes the measurement function at the current mean.
//!
//! ### Guarantees:
//! - Returned covariances are symmetric with every eigenvalue at or above
//!   [`COVARIANCE_EIGEN_FLOOR`]
//! - Inputs are never mutated; every step returns a new snapshot
//! - Ill-conditioned priors are repaired in `predict` and rejected in `update`

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::error::{EngineError, EngineResult};
use crate::linalg::{self, COVARIANCE_EIGEN_FLOOR};
use crate::model::PARAMETER_FLOOR;
use crate::observation::Observation;
use crate::posterior::StatePosterior;

/// Diagonal process-noise rate per month of elapsed model time.
pub const DEFAULT_PROCESS_NOISE_RATE: [f64; 2] = [1e-6, 1e-2];

/// `update` refuses covariances conditioned worse than this.
pub const MAX_CONDITION_NUMBER: f64 = 1e12;

/// `predict` inflates the diagonal of covariances conditioned worse than this.
pub const REPAIR_CONDITION_NUMBER: f64 = 1e10;

/// Innovation variances at or below this are treated as singular.
pub const MIN_INNOVATION_VARIANCE: f64 = 1e-12;

/// Per-update quantities useful for logging and model comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateDiagnostics {
    /// `z − h(mean)`
    pub innovation: f64,
    /// `S = H·Σ·Hᵗ + R`
    pub innovation_variance: f64,
    /// `y² / S`
    pub normalized_innovation_squared: f64,
    /// Gaussian log-likelihood of the innovation.
    pub log_likelihood: f64,
    /// Whether eigenvalue clamping touched the returned covariance.
    pub covariance_clamped: bool,
}

/// Outcome of folding a sequence of observations into a posterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assimilation {
    pub posterior: StatePosterior,
    /// Sum of per-update log-likelihoods.
    pub log_likelihood: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateEstimator {
    process_noise_rate: Matrix2<f64>,
}

impl Default for StateEstimator {
    fn default() -> Self {
        Self {
            process_noise_rate: Matrix2::from_diagonal(&Vector2::from(
                DEFAULT_PROCESS_NOISE_RATE,
            )),
        }
    }
}

impl StateEstimator {
    pub fn new(process_noise_rate: [f64; 2]) -> EngineResult<Self> {
        if !process_noise_rate.iter().all(|q| q.is_finite() && *q >= 0.0) {
            return Err(EngineError::invalid_parameter(
                "process_noise_rate",
                format!("must be finite and non-negative, got {process_noise_rate:?}"),
            ));
        }
        Ok(Self {
            process_noise_rate: Matrix2::from_diagonal(&Vector2::from(process_noise_rate)),
        })
    }

    /// Validates a prior belief and wraps it as the first snapshot.
    pub fn initialize(
        &self,
        prior_mean: Vector2<f64>,
        prior_covariance: Matrix2<f64>,
    ) -> EngineResult<StatePosterior> {
        let posterior = StatePosterior::new(prior_mean, prior_covariance);
        posterior.check_invariants()?;
        Ok(posterior)
    }

    /// Random-walk drift: mean unchanged, covariance grows by `Q · elapsed`.
    pub fn predict(
        &self,
        posterior: &StatePosterior,
        elapsed_time: f64,
    ) -> EngineResult<StatePosterior> {
        if !elapsed_time.is_finite() || elapsed_time < 0.0 {
            return Err(EngineError::invalid_parameter(
                "elapsed_time",
                format!("must be finite and non-negative, got {elapsed_time}"),
            ));
        }
        posterior.check_invariants()?;

        let mut covariance =
            linalg::symmetrize(&(posterior.covariance + self.process_noise_rate * elapsed_time));

        if let Some(shift) = linalg::conditioning_shift(&covariance, REPAIR_CONDITION_NUMBER) {
            warn!(
                shift,
                condition_number = linalg::condition_number(&covariance),
                "Inflating covariance diagonal to repair conditioning"
            );
            covariance += Matrix2::identity() * shift;
        }

        Ok(StatePosterior {
            covariance,
            last_updated_at: posterior.last_updated_at + elapsed_time,
            ..posterior.clone()
        })
    }

    pub fn update(
        &self,
        posterior: &StatePosterior,
        observation: &Observation,
    ) -> EngineResult<StatePosterior> {
        self.update_with_diagnostics(posterior, observation)
            .map(|(next, _)| next)
    }

    /// Linearized measurement update in Joseph form.
    pub fn update_with_diagnostics(
        &self,
        posterior: &StatePosterior,
        observation: &Observation,
    ) -> EngineResult<(StatePosterior, UpdateDiagnostics)> {
        observation.validate()?;
        posterior.check_invariants()?;

        let sigma = posterior.covariance;
        let condition_number = linalg::condition_number(&sigma);
        if condition_number > MAX_CONDITION_NUMBER {
            return Err(EngineError::NumericalInstability {
                condition_number,
                context: "prior covariance".into(),
            });
        }

        let h = observation.jacobian(&posterior.mean);
        let r = observation.variance();
        let innovation = observation.value() - observation.predict(&posterior.mean);
        let s = (h * sigma * h.transpose())[(0, 0)] + r;
        if !s.is_finite() || s <= MIN_INNOVATION_VARIANCE {
            return Err(EngineError::NumericalInstability {
                condition_number: f64::INFINITY,
                context: format!("innovation variance {s:e}"),
            });
        }

        let gain: Vector2<f64> = sigma * h.transpose() / s;
        let mut mean = posterior.mean + gain * innovation;
        if !mean.iter().all(|v| v.is_finite()) {
            return Err(EngineError::NumericalInstability {
                condition_number,
                context: "posterior mean".into(),
            });
        }

        let i_kh = Matrix2::identity() - gain * h;
        let joseph = i_kh * sigma * i_kh.transpose() + gain * gain.transpose() * r;
        let (covariance, covariance_clamped) =
            linalg::clamp_eigenvalues(&linalg::symmetrize(&joseph), COVARIANCE_EIGEN_FLOOR);
        if covariance_clamped {
            trace!("Clamped posterior covariance eigenvalues");
        }

        for value in mean.iter_mut() {
            if *value < PARAMETER_FLOOR {
                warn!(value = *value, "Clamping non-physical parameter estimate");
                *value = PARAMETER_FLOOR;
            }
        }

        let normalized_innovation_squared = innovation * innovation / s;
        let diagnostics = UpdateDiagnostics {
            innovation,
            innovation_variance: s,
            normalized_innovation_squared,
            log_likelihood: -0.5
                * ((2.0 * std::f64::consts::PI * s).ln() + normalized_innovation_squared),
            covariance_clamped,
        };

        debug!(
            innovation,
            innovation_variance = s,
            rate_constant = mean[0],
            saturation_capacity = mean[1],
            "Applied observation"
        );

        let next = StatePosterior {
            mean,
            covariance,
            observation_count: posterior.observation_count + 1,
            last_updated_at: posterior.last_updated_at,
            version: posterior.version + 1,
        };
        Ok((next, diagnostics))
    }

    /// Folds `observations` in caller order, predicting across the gap
    /// between the posterior's model time and each observation.
    #[instrument(skip_all, fields(observations = observations.len()))]
    pub fn assimilate(
        &self,
        posterior: &StatePosterior,
        observations: &[Observation],
    ) -> EngineResult<Assimilation> {
        posterior.check_invariants()?;
        let mut current = posterior.clone();
        let mut log_likelihood = 0.0;

        for observation in observations {
            observation.validate()?;
            let elapsed = observation.time() - current.last_updated_at;
            if elapsed < 0.0 {
                return Err(EngineError::invalid_observation(
                    observation,
                    format!(
                        "observed at {} before posterior time {}",
                        observation.time(),
                        current.last_updated_at
                    ),
                ));
            }
            let predicted = self.predict(&current, elapsed)?;
            let (next, diagnostics) = self.update_with_diagnostics(&predicted, observation)?;
            log_likelihood += diagnostics.log_likelihood;
            current = next;
        }

        debug!(
            observation_count = current.observation_count,
            log_likelihood, "Assimilation complete"
        );
        Ok(Assimilation {
            posterior: current,
            log_likelihood,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::uptake;
    use crate::observation::{FieldObservation, LabObservation};
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn prior(var_k: f64, var_c: f64) -> StatePosterior {
        StateEstimator::default()
            .initialize(
                Vector2::new(0.05, 50.0),
                Matrix2::from_diagonal(&Vector2::new(var_k, var_c)),
            )
            .unwrap()
    }

    fn lab(time_offset: f64, uptake_ratio: f64, measurement_variance: f64) -> Observation {
        LabObservation {
            time_offset,
            uptake_ratio,
            measurement_variance,
        }
        .into()
    }

    #[test]
    fn initialize_rejects_indefinite_prior() {
        let estimator = StateEstimator::default();
        let result = estimator.initialize(
            Vector2::new(0.05, 50.0),
            Matrix2::new(1.0, 0.0, 0.0, -1e-3),
        );
        assert!(matches!(result, Err(EngineError::InvalidState(_))));

        let asymmetric = estimator.initialize(
            Vector2::new(0.05, 50.0),
            Matrix2::new(1.0, 0.3, 0.0, 1.0),
        );
        assert!(matches!(asymmetric, Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn predict_inflates_covariance_only() {
        let estimator = StateEstimator::default();
        let before = prior(1e-3, 400.0);
        let after = estimator.predict(&before, 12.0).unwrap();
        assert_eq!(after.mean, before.mean);
        assert!((after.covariance[(0, 0)] - (1e-3 + 12.0 * 1e-6)).abs() < 1e-15);
        assert!((after.covariance[(1, 1)] - (400.0 + 12.0 * 1e-2)).abs() < 1e-9);
        assert_eq!(after.last_updated_at, 12.0);
        assert_eq!(after.version, before.version);
    }

    #[test]
    fn predict_rejects_negative_elapsed_time() {
        let estimator = StateEstimator::default();
        for elapsed in [-1.0, f64::NAN] {
            assert!(matches!(
                estimator.predict(&prior(1e-3, 400.0), elapsed),
                Err(EngineError::InvalidParameter { name: "elapsed_time", .. })
            ));
        }
    }

    #[test]
    fn lab_scenario_moves_capacity_towards_observation() {
        let estimator = StateEstimator::default();
        let before = prior(1e-3, 400.0);
        let obs = lab(6.0, 20.0, 1.0);
        assert!(obs.predict(&before.mean) < 20.0);

        let after = estimator.update(&before, &obs).unwrap();
        // Value of C_max that alone would explain the observation at k = 0.05.
        let implied = 20.0 / (1.0 - (-0.3f64).exp());
        assert!(after.saturation_capacity() > 50.0);
        assert!(after.saturation_capacity() < implied);
        assert!(implied > 77.0 && implied < 77.5);
        assert_eq!(after.observation_count, 1);
        assert_eq!(after.version, 1);
    }

    #[test]
    fn gain_never_overshoots_implied_value() {
        // Rate constant nearly known: the update acts on C_max alone.
        let estimator = StateEstimator::default();
        let before = prior(1e-8, 400.0);
        let after = estimator.update(&before, &lab(6.0, 20.0, 1.0)).unwrap();
        let implied = 20.0 / (1.0 - (-0.3f64).exp());
        assert!(after.saturation_capacity() > before.saturation_capacity());
        assert!(after.saturation_capacity() < implied);
    }

    #[test]
    fn field_window_updates_posterior() {
        let estimator = StateEstimator::default();
        let before = prior(1e-3, 400.0);
        let truth = Vector2::new(0.05, 80.0);
        let obs: Observation = FieldObservation {
            window_start: 6.0,
            window_end: 18.0,
            removed_amount: uptake(&truth, 18.0) - uptake(&truth, 6.0),
            measurement_variance: 0.25,
        }
        .into();
        let after = estimator.update(&before, &obs).unwrap();
        assert!(after.saturation_capacity() > before.saturation_capacity());
        assert!(after.covariance[(1, 1)] < before.covariance[(1, 1)]);
    }

    #[test]
    fn rejects_empty_window_before_linear_algebra() {
        let estimator = StateEstimator::default();
        // Singular prior: any linear algebra would report NumericalInstability.
        let degenerate = StatePosterior::new(Vector2::new(0.05, 50.0), Matrix2::zeros());
        let obs: Observation = FieldObservation {
            window_start: 12.0,
            window_end: 12.0,
            removed_amount: 1.0,
            measurement_variance: 1.0,
        }
        .into();
        assert!(matches!(
            estimator.update(&degenerate, &obs),
            Err(EngineError::InvalidObservation { .. })
        ));
    }

    #[test]
    fn rejects_posteriors_violating_invariants() {
        let estimator = StateEstimator::default();
        let obs = lab(6.0, 20.0, 1.0);
        let broken = [
            // indefinite covariance
            StatePosterior::new(
                Vector2::new(0.05, 50.0),
                Matrix2::from_diagonal(&Vector2::new(1e-3, -400.0)),
            ),
            // asymmetric covariance
            StatePosterior::new(Vector2::new(0.05, 50.0), Matrix2::new(1e-3, 0.5, 0.0, 400.0)),
            // non-positive mean
            StatePosterior::new(
                Vector2::new(-0.05, -50.0),
                Matrix2::from_diagonal(&Vector2::new(1e-3, 400.0)),
            ),
            // non-finite model time
            StatePosterior {
                last_updated_at: f64::NAN,
                ..prior(1e-3, 400.0)
            },
        ];
        for posterior in &broken {
            assert!(matches!(
                estimator.update(posterior, &obs),
                Err(EngineError::InvalidState(_))
            ));
            assert!(matches!(
                estimator.predict(posterior, 1.0),
                Err(EngineError::InvalidState(_))
            ));
            assert!(matches!(
                estimator.assimilate(posterior, &[obs]),
                Err(EngineError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn predict_repairs_zero_covariance() {
        let estimator = StateEstimator::default();
        let degenerate = estimator
            .initialize(Vector2::new(0.05, 50.0), Matrix2::zeros())
            .unwrap();
        let repaired = estimator.predict(&degenerate, 0.0).unwrap();
        assert!(linalg::eigenvalues(&repaired.covariance)[0] >= COVARIANCE_EIGEN_FLOOR);
        assert!(estimator.update(&repaired, &lab(6.0, 20.0, 1.0)).is_ok());
    }

    #[test]
    fn ill_conditioned_prior_is_rejected_then_repaired_by_predict() {
        let estimator = StateEstimator::default();
        let fragile = StatePosterior::new(
            Vector2::new(0.05, 50.0),
            Matrix2::from_diagonal(&Vector2::new(1e-14, 100.0)),
        );
        let obs = lab(6.0, 20.0, 1.0);
        match estimator.update(&fragile, &obs) {
            Err(EngineError::NumericalInstability {
                condition_number, ..
            }) => assert!(condition_number > MAX_CONDITION_NUMBER),
            other => panic!("expected NumericalInstability, got {other:?}"),
        }

        let repaired = estimator.predict(&fragile, 0.0).unwrap();
        assert!(linalg::condition_number(&repaired.covariance) <= REPAIR_CONDITION_NUMBER * 1.001);
        assert!(estimator.update(&repaired, &obs).is_ok());
    }

    #[test]
    fn assimilate_runs_predict_update_in_order() {
        let estimator = StateEstimator::default();
        let observations = vec![
            lab(1.0, 4.0, 1.0),
            lab(3.0, 10.0, 1.0),
            FieldObservation {
                window_start: 3.0,
                window_end: 9.0,
                removed_amount: 12.0,
                measurement_variance: 2.0,
            }
            .into(),
        ];
        let result = estimator
            .assimilate(&StatePosterior::default_prior(), &observations)
            .unwrap();
        assert_eq!(result.posterior.observation_count, 3);
        assert_eq!(result.posterior.version, 3);
        assert_eq!(result.posterior.last_updated_at, 9.0);
        assert!(result.log_likelihood.is_finite());
        result.posterior.check_invariants().unwrap();
    }

    #[test]
    fn assimilate_rejects_out_of_order_observation() {
        let estimator = StateEstimator::default();
        let observations = vec![lab(6.0, 12.0, 1.0), lab(2.0, 5.0, 1.0)];
        assert!(matches!(
            estimator.assimilate(&StatePosterior::default_prior(), &observations),
            Err(EngineError::InvalidObservation { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn clamps_non_physical_estimates() {
        let estimator = StateEstimator::default();
        // An uncertain rate constant absorbs the whole innovation and overshoots below zero.
        let before = prior(1e-2, 1e-2);
        let after = estimator.update(&before, &lab(6.0, 0.0, 1e-3)).unwrap();
        assert_eq!(after.rate_constant(), PARAMETER_FLOOR);
        after.check_invariants().unwrap();
        assert!(logs_contain("Clamping non-physical parameter estimate"));
    }

    proptest! {
        #[test]
        fn updated_covariance_stays_symmetric_above_floor(
            k in 0.005f64..0.5,
            c_max in 1.0f64..200.0,
            var_k in 1e-6f64..1e-2,
            var_c in 1e-2f64..1e3,
            correlation in -0.9f64..0.9,
            time_offset in 0.0f64..120.0,
            window in 0.01f64..60.0,
            uptake_ratio in 0.0f64..300.0,
            measurement_variance in 1e-3f64..50.0,
            field in any::<bool>(),
        ) {
            let estimator = StateEstimator::default();
            let cov_kc = correlation * (var_k * var_c).sqrt();
            let before = estimator
                .initialize(Vector2::new(k, c_max), Matrix2::new(var_k, cov_kc, cov_kc, var_c))
                .unwrap();
            let obs: Observation = if field {
                FieldObservation {
                    window_start: time_offset,
                    window_end: time_offset + window,
                    removed_amount: uptake_ratio,
                    measurement_variance,
                }
                .into()
            } else {
                lab(time_offset, uptake_ratio, measurement_variance)
            };
            let predicted = estimator.predict(&before, obs.time()).unwrap();
            let after = estimator.update(&predicted, &obs).unwrap();

            prop_assert!(linalg::is_symmetric(&after.covariance));
            prop_assert!(linalg::eigenvalues(&after.covariance)[0] >= COVARIANCE_EIGEN_FLOOR * 0.99);
            prop_assert!(after.check_invariants().is_ok());
        }
    }
}
