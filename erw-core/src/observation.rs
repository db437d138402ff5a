//! Calibration measurements.
//!
//! Lab observations sample the uptake curve at a point in time; field
//! observations measure the removal accumulated over a window. Both are
//! scalar nonlinear measurements of the same state and differ only in their
//! measurement function and variance.

use nalgebra::{RowVector2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{uptake, uptake_jacobian};

/// Uptake measured in the laboratory at `time_offset` months.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabObservation {
    pub time_offset: f64,
    pub uptake_ratio: f64,
    pub measurement_variance: f64,
}

/// Removal measured in the field between `window_start` and `window_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    pub window_start: f64,
    pub window_end: f64,
    pub removed_amount: f64,
    pub measurement_variance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Lab(LabObservation),
    Field(FieldObservation),
}

impl From<LabObservation> for Observation {
    fn from(observation: LabObservation) -> Self {
        Observation::Lab(observation)
    }
}

impl From<FieldObservation> for Observation {
    fn from(observation: FieldObservation) -> Self {
        Observation::Field(observation)
    }
}

impl Observation {
    /// Rejects non-finite values, negative times or amounts, non-positive
    /// variances and empty field windows.
    pub fn validate(&self) -> EngineResult<()> {
        let fail = |reason: &str| Err(EngineError::invalid_observation(self, reason));

        match self {
            Observation::Lab(lab) => {
                if !(lab.time_offset.is_finite()
                    && lab.uptake_ratio.is_finite()
                    && lab.measurement_variance.is_finite())
                {
                    return fail("non-finite value");
                }
                if lab.time_offset < 0.0 {
                    return fail("time_offset must be non-negative");
                }
                if lab.uptake_ratio < 0.0 {
                    return fail("uptake_ratio must be non-negative");
                }
            }
            Observation::Field(field) => {
                if !(field.window_start.is_finite()
                    && field.window_end.is_finite()
                    && field.removed_amount.is_finite()
                    && field.measurement_variance.is_finite())
                {
                    return fail("non-finite value");
                }
                if field.window_start < 0.0 {
                    return fail("window_start must be non-negative");
                }
                if field.window_end <= field.window_start {
                    return fail("window_end must be after window_start");
                }
                if field.removed_amount < 0.0 {
                    return fail("removed_amount must be non-negative");
                }
            }
        }

        if self.variance() <= 0.0 {
            return fail("measurement_variance must be positive");
        }
        Ok(())
    }

    /// Model time at which the observation is complete.
    pub fn time(&self) -> f64 {
        match self {
            Observation::Lab(lab) => lab.time_offset,
            Observation::Field(field) => field.window_end,
        }
    }

    /// Measured value `z`.
    pub fn value(&self) -> f64 {
        match self {
            Observation::Lab(lab) => lab.uptake_ratio,
            Observation::Field(field) => field.removed_amount,
        }
    }

    /// Measurement noise `R`.
    pub fn variance(&self) -> f64 {
        match self {
            Observation::Lab(lab) => lab.measurement_variance,
            Observation::Field(field) => field.measurement_variance,
        }
    }

    /// Measurement function evaluated at `params`.
    pub fn predict(&self, params: &Vector2<f64>) -> f64 {
        match self {
            Observation::Lab(lab) => uptake(params, lab.time_offset),
            Observation::Field(field) => {
                uptake(params, field.window_end) - uptake(params, field.window_start)
            }
        }
    }

    /// Jacobian of the measurement function at `params`.
    pub fn jacobian(&self, params: &Vector2<f64>) -> RowVector2<f64> {
        match self {
            Observation::Lab(lab) => uptake_jacobian(params, lab.time_offset),
            Observation::Field(field) => {
                uptake_jacobian(params, field.window_end)
                    - uptake_jacobian(params, field.window_start)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab(time_offset: f64, uptake_ratio: f64) -> Observation {
        LabObservation {
            time_offset,
            uptake_ratio,
            measurement_variance: 1.0,
        }
        .into()
    }

    fn field(window_start: f64, window_end: f64) -> Observation {
        FieldObservation {
            window_start,
            window_end,
            removed_amount: 3.0,
            measurement_variance: 0.5,
        }
        .into()
    }

    #[test]
    fn accepts_well_formed_records() {
        assert!(lab(6.0, 20.0).validate().is_ok());
        assert!(lab(0.0, 0.0).validate().is_ok());
        assert!(field(0.0, 12.0).validate().is_ok());
    }

    #[test]
    fn rejects_empty_field_window() {
        for (start, end) in [(6.0, 6.0), (12.0, 6.0)] {
            let obs = field(start, end);
            match obs.validate() {
                Err(EngineError::InvalidObservation { observation, reason }) => {
                    assert_eq!(observation, obs);
                    assert!(reason.contains("window_end"));
                }
                other => panic!("expected InvalidObservation, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_non_finite_and_negative_values() {
        assert!(lab(f64::NAN, 1.0).validate().is_err());
        assert!(lab(1.0, f64::INFINITY).validate().is_err());
        assert!(lab(-1.0, 1.0).validate().is_err());
        assert!(lab(1.0, -0.1).validate().is_err());

        let zero_variance = Observation::Lab(LabObservation {
            time_offset: 1.0,
            uptake_ratio: 1.0,
            measurement_variance: 0.0,
        });
        assert!(zero_variance.validate().is_err());
    }

    #[test]
    fn field_measurement_is_window_difference() {
        let x = Vector2::new(0.05, 50.0);
        let obs = field(6.0, 18.0);
        let expected = uptake(&x, 18.0) - uptake(&x, 6.0);
        assert!((obs.predict(&x) - expected).abs() < 1e-12);

        let jac = obs.jacobian(&x);
        let expected_jac = uptake_jacobian(&x, 18.0) - uptake_jacobian(&x, 6.0);
        assert_eq!(jac, expected_jac);
        assert_eq!(obs.time(), 18.0);
    }

    #[test]
    fn deserializes_tagged_records() {
        let yaml = r#"
- kind: lab
  time_offset: 6.0
  uptake_ratio: 20.0
  measurement_variance: 1.0
- kind: field
  window_start: 0.0
  window_end: 12.0
  removed_amount: 4.5
  measurement_variance: 2.0
"#;
        let records: Vec<Observation> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], lab(6.0, 20.0));
        assert!(matches!(records[1], Observation::Field(f) if f.window_end == 12.0));
    }
}
