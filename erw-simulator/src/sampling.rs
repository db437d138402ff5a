//! ## erw-simulator::sampling
//! **Posterior parameter draws**
//!
//! Every sample owns a ChaCha8 stream selected by its index, so the values
//! drawn for sample `i` depend only on the seed and `i`, never on which
//! worker processes it.

use std::f64::consts::PI;

use nalgebra::{Matrix2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use erw_core::linalg;
use erw_core::model::{is_physical, PARAMETER_FLOOR};
use erw_core::posterior::StatePosterior;
use erw_core::{EngineError, EngineResult};

/// Redraws allowed for a non-physical sample before clamping.
pub const MAX_RESAMPLE_ATTEMPTS: u32 = 16;

/// Generator for sample `index` of the run seeded with `seed`.
pub fn sample_rng(seed: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index);
    rng
}

/// Standard normal variate (Box-Muller).
#[inline]
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random();
    let u2: f64 = rng.random();
    let u1 = if u1 == 0.0 { f64::MIN_POSITIVE } else { u1 };
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDraw {
    pub params: Vector2<f64>,
    /// Draws consumed, including the accepted one.
    pub attempts: u32,
    /// Set when every attempt was non-physical and the last one was clamped.
    pub clamped: bool,
}

/// Draws `x = mean + L·z` from a validated posterior.
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    mean: Vector2<f64>,
    factor: Matrix2<f64>,
}

impl ParameterSampler {
    pub fn new(posterior: &StatePosterior) -> EngineResult<Self> {
        posterior.check_invariants()?;
        let factor = linalg::square_root(&posterior.covariance).ok_or_else(|| {
            EngineError::InvalidState(format!(
                "covariance has no real square root: {:?}",
                posterior.covariance
            ))
        })?;
        Ok(Self {
            mean: posterior.mean,
            factor,
        })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterDraw {
        let mut last = self.mean;
        for attempt in 1..=MAX_RESAMPLE_ATTEMPTS {
            let z = Vector2::new(standard_normal(rng), standard_normal(rng));
            let candidate = self.mean + self.factor * z;
            if is_physical(&candidate) {
                return ParameterDraw {
                    params: candidate,
                    attempts: attempt,
                    clamped: false,
                };
            }
            last = candidate;
        }
        ParameterDraw {
            params: last.map(|v| {
                if v.is_finite() {
                    v.max(PARAMETER_FLOOR)
                } else {
                    PARAMETER_FLOOR
                }
            }),
            attempts: MAX_RESAMPLE_ATTEMPTS,
            clamped: true,
        }
    }
}
