use thiserror::Error;

use crate::observation::Observation;

/// Failure taxonomy shared by the estimator and the simulation engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid observation {observation:?}: {reason}")]
    InvalidObservation {
        observation: Observation,
        reason: String,
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Numerical instability in {context}: condition number {condition_number:e}")]
    NumericalInstability {
        condition_number: f64,
        context: String,
    },

    /// Cooperative abort. Only raised when nothing was processed before the
    /// cancellation was observed; otherwise a partial result is returned.
    #[error("Cancelled after {processed} samples")]
    Cancelled { processed: usize },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub(crate) fn invalid_observation(observation: &Observation, reason: impl Into<String>) -> Self {
        EngineError::InvalidObservation {
            observation: *observation,
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
