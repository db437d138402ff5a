//! ## erw-simulator::accumulator
//! **Per-period streaming statistics**
//!
//! Each forecast period owns a [`PeriodAccumulator`]: count, running mean
//! and sum of squared deviations (Welford), extrema, the number of samples
//! at or above the target, and a quantile sketch. Partial accumulators
//! combine with the pairwise update of Chan et al., which is associative
//! up to round-off and commutative bit for bit.

use serde::{Deserialize, Serialize};

use erw_core::{EngineError, EngineResult};

use crate::sketch::QuantileSketch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAccumulator {
    period: usize,
    threshold: f64,
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    hits: u64,
    sketch: QuantileSketch,
}

impl PeriodAccumulator {
    /// Empty accumulator for `period` counting samples `>= threshold`.
    pub fn new(period: usize, threshold: f64) -> Self {
        Self {
            period,
            threshold,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            hits: 0,
            sketch: QuantileSketch::default(),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if value >= self.threshold {
            self.hits += 1;
        }
        self.sketch.insert(value);
    }

    /// Accumulator representing the union of both sample sets.
    pub fn merge(&self, other: &PeriodAccumulator) -> EngineResult<PeriodAccumulator> {
        if self.period != other.period {
            return Err(EngineError::invalid_parameter(
                "accumulator",
                format!("cannot merge period {} with period {}", self.period, other.period),
            ));
        }
        if self.threshold.to_bits() != other.threshold.to_bits() {
            return Err(EngineError::invalid_parameter(
                "accumulator",
                format!(
                    "target thresholds differ ({} vs {})",
                    self.threshold, other.threshold
                ),
            ));
        }

        let count = self.count + other.count;
        let (mean, m2) = if count == 0 {
            (0.0, 0.0)
        } else {
            let (na, nb) = (self.count as f64, other.count as f64);
            let n = count as f64;
            let delta = other.mean - self.mean;
            (
                (na * self.mean + nb * other.mean) / n,
                (self.m2 + other.m2) + delta * delta * (na * nb) / n,
            )
        };

        Ok(PeriodAccumulator {
            period: self.period,
            threshold: self.threshold,
            count,
            mean,
            m2,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            hits: self.hits + other.hits,
            sketch: self.sketch.merge(&other.sketch),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population variance.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).max(0.0))
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Fraction of samples at or above the threshold.
    pub fn hit_probability(&self) -> Option<f64> {
        (self.count > 0).then(|| self.hits as f64 / self.count as f64)
    }

    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.sketch.quantile(q)
    }
}

/// One [`PeriodAccumulator`] per forecast period, indexed `0..horizon`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccumulator {
    periods: Vec<PeriodAccumulator>,
}

impl ForecastAccumulator {
    pub fn new(horizon: usize, threshold: f64) -> Self {
        Self {
            periods: (0..horizon)
                .map(|period| PeriodAccumulator::new(period, threshold))
                .collect(),
        }
    }

    /// Folds one sample's value for `period` (zero-based).
    pub fn record(&mut self, period: usize, value: f64) -> EngineResult<()> {
        let horizon = self.periods.len();
        let accumulator = self.periods.get_mut(period).ok_or_else(|| {
            EngineError::invalid_parameter(
                "period",
                format!("period {period} is outside horizon {horizon}"),
            )
        })?;
        accumulator.push(value);
        Ok(())
    }

    pub(crate) fn periods_mut(&mut self) -> &mut [PeriodAccumulator] {
        &mut self.periods
    }

    pub fn merge(&self, other: &ForecastAccumulator) -> EngineResult<ForecastAccumulator> {
        if self.periods.len() != other.periods.len() {
            return Err(EngineError::invalid_parameter(
                "accumulator",
                format!(
                    "horizons differ ({} vs {})",
                    self.periods.len(),
                    other.periods.len()
                ),
            ));
        }
        let periods = self
            .periods
            .iter()
            .zip(&other.periods)
            .map(|(a, b)| a.merge(b))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(ForecastAccumulator { periods })
    }

    pub fn horizon(&self) -> usize {
        self.periods.len()
    }

    /// Samples seen by the first period (every sample covers all periods).
    pub fn sample_count(&self) -> u64 {
        self.periods.first().map_or(0, PeriodAccumulator::count)
    }

    pub fn periods(&self) -> &[PeriodAccumulator] {
        &self.periods
    }
}
