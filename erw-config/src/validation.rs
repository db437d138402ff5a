//! Custom validation functions for configuration.

use validator::ValidationError;

/// Every entry finite and non-negative.
pub fn validate_non_negative_pair(values: &[f64; 2]) -> Result<(), ValidationError> {
    if values.iter().all(|v| v.is_finite() && *v >= 0.0) {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_non_negative"))
    }
}

/// Every entry finite and strictly positive.
pub fn validate_positive_pair(values: &[f64; 2]) -> Result<(), ValidationError> {
    if values.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive"))
    }
}

/// Tracing level names accepted by the subscriber.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
