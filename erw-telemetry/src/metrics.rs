//! ## erw-telemetry::metrics
//! **Prometheus counters and run-duration histogram**

use std::time::Duration;

use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub observations_assimilated: Counter,
    pub samples_simulated: Counter,
    pub cancelled_runs: Counter,
    pub run_duration: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let observations_assimilated = Counter::new(
            "erw_observations_assimilated_total",
            "Observations folded into a posterior",
        )?;
        let samples_simulated = Counter::new(
            "erw_samples_simulated_total",
            "Monte Carlo samples accumulated",
        )?;
        let cancelled_runs = Counter::new(
            "erw_cancelled_runs_total",
            "Simulation runs stopped before completion",
        )?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new("erw_run_duration_seconds", "Wall-clock time per simulation run")
                .buckets(vec![0.01, 0.1, 1.0, 10.0, 60.0]),
        )?;

        registry.register(Box::new(observations_assimilated.clone()))?;
        registry.register(Box::new(samples_simulated.clone()))?;
        registry.register(Box::new(cancelled_runs.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            observations_assimilated,
            samples_simulated,
            cancelled_runs,
            run_duration,
        })
    }

    pub fn record_assimilation(&self, observations: usize) {
        self.observations_assimilated.inc_by(observations as f64);
    }

    pub fn record_run(&self, samples: usize, completed: bool, elapsed: Duration) {
        self.samples_simulated.inc_by(samples as f64);
        if !completed {
            self.cancelled_runs.inc();
        }
        self.run_duration.observe(elapsed.as_secs_f64());
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
