//! # ERW Telemetry
//!
//! Logging setup and Prometheus metrics for the forecast engine.

pub mod logging;
pub mod metrics;

pub use logging::TracingSetup;
pub use metrics::MetricsRecorder;
