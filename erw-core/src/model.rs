//! ## erw-core::model
//! **Saturating uptake curve**
//!
//! Capture after elapsed time `t` is `h(x, t) = C_max · (1 − exp(−k · t))`
//! with state `x = [k, C_max]`.

use nalgebra::{RowVector2, Vector2};

/// Index of the rate constant `k` in the state vector.
pub const RATE_CONSTANT: usize = 0;
/// Index of the saturation capacity `C_max` in the state vector.
pub const SATURATION_CAPACITY: usize = 1;

/// Smallest admissible value for either parameter.
pub const PARAMETER_FLOOR: f64 = 1e-6;

/// Evaluates `h(x, t)`.
#[inline]
pub fn uptake(params: &Vector2<f64>, t: f64) -> f64 {
    // 1 − e^(−kt) == −expm1(−kt), exact for small kt
    params[SATURATION_CAPACITY] * -(-params[RATE_CONSTANT] * t).exp_m1()
}

/// Partial derivatives of `h(x, t)` with respect to `[k, C_max]`.
#[inline]
pub fn uptake_jacobian(params: &Vector2<f64>, t: f64) -> RowVector2<f64> {
    let k = params[RATE_CONSTANT];
    let c_max = params[SATURATION_CAPACITY];
    let decay = (-k * t).exp();
    RowVector2::new(c_max * t * decay, -(-k * t).exp_m1())
}

/// True when both parameters are finite and strictly positive.
#[inline]
pub fn is_physical(params: &Vector2<f64>) -> bool {
    params.iter().all(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptake_matches_closed_form() {
        let x = Vector2::new(0.05, 50.0);
        let expected = 50.0 * (1.0 - (-0.3f64).exp());
        assert!((uptake(&x, 6.0) - expected).abs() < 1e-12);
        assert!((uptake(&x, 6.0) - 12.959).abs() < 1e-3);
        assert_eq!(uptake(&x, 0.0), 0.0);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let x = Vector2::new(0.07, 42.0);
        let t = 9.0;
        let jac = uptake_jacobian(&x, t);
        let eps = 1e-7;
        for i in 0..2 {
            let mut hi = x;
            let mut lo = x;
            hi[i] += eps;
            lo[i] -= eps;
            let numeric = (uptake(&hi, t) - uptake(&lo, t)) / (2.0 * eps);
            assert!((numeric - jac[i]).abs() < 1e-5, "component {i}");
        }
    }

    #[test]
    fn physical_rejects_non_positive() {
        assert!(is_physical(&Vector2::new(0.1, 1.0)));
        assert!(!is_physical(&Vector2::new(0.0, 1.0)));
        assert!(!is_physical(&Vector2::new(0.1, -1.0)));
        assert!(!is_physical(&Vector2::new(f64::NAN, 1.0)));
    }
}
