//! Site configuration supplied by the surrounding system.
//!
//! Read-only to the engine: an application rate, a climate bucket and the
//! optional chemistry factor and per-period risk multipliers.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{EngineError, EngineResult};
use crate::validation;

/// Target capture as a multiple of the application rate.
///
/// TODO: make this a per-site setting if stakeholders confirm targets vary
/// by site.
pub const TARGET_MULTIPLIER: f64 = 10.0;

/// Climate category with a fixed weathering scaling factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateBucket {
    Arid,
    SemiArid,
    #[default]
    Temperate,
    Humid,
    Tropical,
}

impl ClimateBucket {
    pub const fn scaling_factor(self) -> f64 {
        match self {
            ClimateBucket::Arid => 0.6,
            ClimateBucket::SemiArid => 0.8,
            ClimateBucket::Temperate => 1.0,
            ClimateBucket::Humid => 1.15,
            ClimateBucket::Tropical => 1.3,
        }
    }
}

fn default_chemistry_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Configuration {
    /// Identifier echoed into simulation reports.
    #[validate(length(min = 1, max = 100))]
    pub config_id: String,

    /// Tonnes of rock per unit area.
    pub application_rate: f64,

    #[serde(default)]
    pub climate_bucket: ClimateBucket,

    /// Rock chemistry multiplier (1.0 leaves the trajectory unscaled).
    #[serde(default = "default_chemistry_factor")]
    #[validate(range(min = 0.1, max = 10.0))]
    pub chemistry_factor: f64,

    /// Per-period multipliers; periods past the end reuse the last entry.
    #[serde(default)]
    #[validate(custom(function = validation::validate_risk_multipliers))]
    pub risk_multipliers: Vec<f64>,
}

impl Configuration {
    pub fn new(
        config_id: impl Into<String>,
        application_rate: f64,
        climate_bucket: ClimateBucket,
    ) -> Self {
        Self {
            config_id: config_id.into(),
            application_rate,
            climate_bucket,
            chemistry_factor: default_chemistry_factor(),
            risk_multipliers: Vec::new(),
        }
    }

    /// Runs the derived validators plus the finiteness checks `validator`
    /// cannot express.
    pub fn check(&self) -> EngineResult<()> {
        validation::validate_positive_finite(self.application_rate).map_err(|_| {
            EngineError::invalid_parameter(
                "application_rate",
                format!("must be positive and finite, got {}", self.application_rate),
            )
        })?;
        if !self.chemistry_factor.is_finite() {
            return Err(EngineError::invalid_parameter(
                "chemistry_factor",
                "must be finite",
            ));
        }
        self.validate()
            .map_err(|e| EngineError::invalid_parameter("configuration", e.to_string()))
    }

    /// `TARGET_MULTIPLIER × application_rate`.
    pub fn target_value(&self) -> f64 {
        self.application_rate * TARGET_MULTIPLIER
    }

    /// Factor applied to the uptake curve before risk multipliers.
    pub fn trajectory_scale(&self) -> f64 {
        self.application_rate * self.climate_bucket.scaling_factor() * self.chemistry_factor
    }

    /// Risk multiplier for the zero-based `period_index`.
    pub fn risk_multiplier(&self, period_index: usize) -> f64 {
        match self.risk_multipliers.get(period_index) {
            Some(m) => *m,
            None => self.risk_multipliers.last().copied().unwrap_or(1.0),
        }
    }
}
