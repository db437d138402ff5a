//! Symmetric 2×2 helpers used by the estimator and the sampler.

use nalgebra::{Cholesky, Matrix2, SymmetricEigen, Vector2};

/// Smallest eigenvalue a returned posterior covariance may carry.
pub const COVARIANCE_EIGEN_FLOOR: f64 = 1e-9;

/// Relative tolerance for symmetry and semi-definiteness checks.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

pub fn symmetrize(m: &Matrix2<f64>) -> Matrix2<f64> {
    (m + m.transpose()) * 0.5
}

fn scale(m: &Matrix2<f64>) -> f64 {
    m.amax().max(1.0)
}

pub fn is_symmetric(m: &Matrix2<f64>) -> bool {
    (m[(0, 1)] - m[(1, 0)]).abs() <= SYMMETRY_TOLERANCE * scale(m)
}

/// Eigenvalues of the symmetric part, ascending.
pub fn eigenvalues(m: &Matrix2<f64>) -> Vector2<f64> {
    let values = SymmetricEigen::new(symmetrize(m)).eigenvalues;
    if values[0] <= values[1] {
        values
    } else {
        Vector2::new(values[1], values[0])
    }
}

/// Symmetric and no eigenvalue below `-SYMMETRY_TOLERANCE · scale`.
pub fn is_positive_semi_definite(m: &Matrix2<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
        && is_symmetric(m)
        && eigenvalues(m)[0] >= -SYMMETRY_TOLERANCE * scale(m)
}

/// Ratio of largest to smallest eigenvalue magnitude; infinite when singular.
pub fn condition_number(m: &Matrix2<f64>) -> f64 {
    let values = eigenvalues(m).abs();
    let (small, large) = (values.min(), values.max());
    if small == 0.0 || !small.is_finite() || !large.is_finite() {
        f64::INFINITY
    } else {
        large / small
    }
}

/// Rebuilds `m` with every eigenvalue raised to at least `floor`.
/// The flag reports whether any eigenvalue had to move.
pub fn clamp_eigenvalues(m: &Matrix2<f64>, floor: f64) -> (Matrix2<f64>, bool) {
    let eigen = SymmetricEigen::new(symmetrize(m));
    let clamped = eigen.eigenvalues.iter().any(|v| *v < floor);
    if !clamped {
        return (symmetrize(m), false);
    }
    let values = eigen.eigenvalues.map(|v| v.max(floor));
    let rebuilt =
        eigen.eigenvectors * Matrix2::from_diagonal(&values) * eigen.eigenvectors.transpose();
    (symmetrize(&rebuilt), true)
}

/// Smallest diagonal shift bringing the condition number down to `target`.
pub fn conditioning_shift(m: &Matrix2<f64>, target: f64) -> Option<f64> {
    let values = eigenvalues(m);
    let (small, large) = (values[0], values[1]);
    if small > 0.0 && large / small <= target {
        return None;
    }
    // (large + δ) / (small + δ) = target; a zero matrix still needs a floor
    Some(((large - target * small) / (target - 1.0)).max(COVARIANCE_EIGEN_FLOOR))
}

/// Lower factor `L` with `L·Lᵗ = m` for a semi-definite `m`.
///
/// Cholesky is tried first; singular but semi-definite inputs fall back to
/// the eigen square root `V·√Λ`.
pub fn square_root(m: &Matrix2<f64>) -> Option<Matrix2<f64>> {
    if !is_positive_semi_definite(m) {
        return None;
    }
    if let Some(chol) = Cholesky::new(symmetrize(m)) {
        return Some(chol.l());
    }
    let eigen = SymmetricEigen::new(symmetrize(m));
    let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    Some(eigen.eigenvectors * Matrix2::from_diagonal(&roots))
}
