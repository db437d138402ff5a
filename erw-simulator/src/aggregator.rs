//! ## erw-simulator::aggregator
//! **Forecast reports**
//!
//! Turns per-period accumulators into summaries and the scenario-level
//! target metrics. Every function here is pure; finalizing the same
//! accumulator twice yields identical output.

use serde::{Deserialize, Serialize};

use erw_core::configuration::Configuration;
use erw_core::{EngineError, EngineResult};

use crate::accumulator::{ForecastAccumulator, PeriodAccumulator};
use crate::engine::SimulationRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// Zero-based period index; period `i` covers elapsed time `i + 1`.
    pub period: usize,
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
    /// Fraction of samples at or above the target value.
    pub hit_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config_reference: String,
    pub seed: u64,
    pub sample_count: usize,
    pub effective_sample_count: usize,
    pub horizon: usize,
    pub periods: Vec<PeriodSummary>,
    pub target_value: f64,
    pub target_attained_period: Option<usize>,
    /// Hit probability of the last period.
    pub final_hit_probability: f64,
    pub completed: bool,
}

fn summarize(period: &PeriodAccumulator) -> EngineResult<PeriodSummary> {
    let empty = || {
        EngineError::InvalidState(format!(
            "period {} has no samples to summarize",
            period.period()
        ))
    };
    Ok(PeriodSummary {
        period: period.period(),
        count: period.count(),
        mean: period.mean().ok_or_else(empty)?,
        std_dev: period.variance().ok_or_else(empty)?.sqrt(),
        min: period.min().ok_or_else(empty)?,
        max: period.max().ok_or_else(empty)?,
        p5: period.quantile(0.05).ok_or_else(empty)?,
        p50: period.quantile(0.50).ok_or_else(empty)?,
        p95: period.quantile(0.95).ok_or_else(empty)?,
        hit_probability: period.hit_probability().ok_or_else(empty)?,
    })
}

/// Per-period summaries ordered by period index.
pub fn finalize(accumulator: &ForecastAccumulator) -> EngineResult<Vec<PeriodSummary>> {
    accumulator.periods().iter().map(summarize).collect()
}

/// Union of two partial forecasts over the same horizon and target.
pub fn merge(
    a: &ForecastAccumulator,
    b: &ForecastAccumulator,
) -> EngineResult<ForecastAccumulator> {
    a.merge(b)
}

/// First period whose median reaches `target_value`.
pub fn target_attained_period(periods: &[PeriodSummary], target_value: f64) -> Option<usize> {
    periods
        .iter()
        .find(|summary| summary.p50 >= target_value)
        .map(|summary| summary.period)
}

pub fn report(run: &SimulationRun, configuration: &Configuration) -> EngineResult<SimulationReport> {
    let periods = finalize(&run.accumulator)?;
    let target_value = configuration.target_value();
    Ok(SimulationReport {
        config_reference: configuration.config_id.clone(),
        seed: run.seed,
        sample_count: run.requested_samples,
        effective_sample_count: run.effective_sample_count,
        horizon: run.horizon,
        target_attained_period: target_attained_period(&periods, target_value),
        final_hit_probability: periods.last().map_or(0.0, |p| p.hit_probability),
        target_value,
        periods,
        completed: run.completed,
    })
}
