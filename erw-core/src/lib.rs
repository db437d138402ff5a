//! # erw-core
//!
//! Numerical core of the enhanced rock weathering forecaster.
//!
//! Calibration measurements (lab uptake curves and field removal windows) are
//! fused into a posterior belief over the two parameters of a saturating
//! uptake model using a Jacobian‑linearized Kalman recursion.
//!
//! ### Key Submodules:
//! - `model`: the uptake curve `h(x, t)` and its Jacobian
//! - `observation`: lab and field measurements and their validation
//! - `configuration`: site configuration (application rate, climate)
//! - `posterior`: immutable, versioned posterior snapshots
//! - `estimator`: predict/update cycle producing new snapshots
//! - `linalg`: symmetric 2×2 helpers (eigen floors, conditioning, square roots)

pub mod configuration;
pub mod error;
pub mod estimator;
pub mod linalg;
pub mod model;
pub mod observation;
pub mod posterior;
mod validation;

pub mod prelude {
    pub use crate::configuration::{ClimateBucket, Configuration, TARGET_MULTIPLIER};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::estimator::{Assimilation, StateEstimator, UpdateDiagnostics};
    pub use crate::observation::{FieldObservation, LabObservation, Observation};
    pub use crate::posterior::StatePosterior;
}

pub use error::{EngineError, EngineResult};
