//! ## erw-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! `RUST_LOG` takes precedence over the configured level.

use tracing::{info_span, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct TracingSetup;

impl TracingSetup {
    /// Installs the global subscriber. Fails if one is already installed.
    pub fn init(level: &str) -> Result<(), InitError> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .try_init()
    }

    /// Span wrapping one pipeline stage (`assimilate`, `simulate`, ...).
    #[inline]
    pub fn stage_span(stage: &'static str, config_id: &str) -> Span {
        info_span!("stage", stage, config = config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn logs_inside_stage_span() {
        let span = TracingSetup::stage_span("simulate", "site-a");
        span.in_scope(|| tracing::info!("Forecast requested"));
        assert!(logs_contain("Forecast requested"));
    }
}
