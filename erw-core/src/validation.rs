//! Custom validators for site configuration.

use validator::ValidationError;

/// Risk multipliers must be finite and non-negative.
pub fn validate_risk_multipliers(values: &[f64]) -> Result<(), ValidationError> {
    if values.iter().all(|m| m.is_finite() && *m >= 0.0) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_risk_multiplier"))
    }
}

/// Strictly positive and finite.
pub fn validate_positive_finite(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive_finite"))
    }
}
