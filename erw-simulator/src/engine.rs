//! ## erw-simulator::engine
//! **Parallel Monte Carlo forecast**
//!
//! Samples are split into fixed batches keyed by sample index. Scoped worker
//! threads claim batches from a shared counter and send each finished batch
//! accumulator over a channel; the collector merges them in batch order, so
//! the result is a pure function of the seed regardless of worker count.
//! Cancellation is observed between batches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam::channel;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use erw_config::SimulationConfig;
use erw_core::configuration::Configuration;
use erw_core::model::uptake;
use erw_core::posterior::StatePosterior;
use erw_core::{EngineError, EngineResult};

use crate::accumulator::ForecastAccumulator;
use crate::cancel::CancellationToken;
use crate::sampling::{sample_rng, standard_normal, ParameterSampler};

/// Outcome of one engine run, complete or cut short by cancellation.
///
/// Batches are claimed in index order and every claimed batch finishes, so a
/// partial run always covers the sample indices `0..effective_sample_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub seed: u64,
    pub requested_samples: usize,
    /// Samples actually folded into `accumulator`.
    pub effective_sample_count: usize,
    pub completed: bool,
    /// Samples whose parameters had to be clamped after exhausting redraws.
    pub clamped_samples: usize,
    pub horizon: usize,
    pub accumulator: ForecastAccumulator,
}

impl SimulationRun {
    /// Index of the first sample a resumed run still has to draw.
    pub fn next_sample(&self) -> usize {
        self.effective_sample_count
    }
}

struct BatchOutcome {
    index: usize,
    accumulator: ForecastAccumulator,
    clamped: usize,
}

/// Read-only inputs shared by every worker.
struct RunPlan<'a> {
    sampler: ParameterSampler,
    configuration: &'a Configuration,
    seed: u64,
    horizon: usize,
    /// Samples `first_sample..sample_count` are drawn by this plan.
    first_sample: usize,
    sample_count: usize,
    batch_size: usize,
    noise_scale: f64,
    scale: f64,
    threshold: f64,
}

impl RunPlan<'_> {
    fn batch_count(&self) -> usize {
        (self.sample_count - self.first_sample).div_ceil(self.batch_size)
    }

    fn simulate_batch(&self, index: usize) -> BatchOutcome {
        let start = self.first_sample + index * self.batch_size;
        let end = (start + self.batch_size).min(self.sample_count);
        let mut accumulator = ForecastAccumulator::new(self.horizon, self.threshold);
        let mut clamped = 0;

        for sample in start..end {
            let mut rng = sample_rng(self.seed, sample as u64);
            let draw = self.sampler.draw(&mut rng);
            if draw.clamped {
                clamped += 1;
            }
            for (period, slot) in accumulator.periods_mut().iter_mut().enumerate() {
                let t = (period + 1) as f64;
                let mut value = uptake(&draw.params, t)
                    * self.scale
                    * self.configuration.risk_multiplier(period);
                if self.noise_scale > 0.0 {
                    value += self.noise_scale * t.sqrt() * standard_normal(&mut rng);
                }
                slot.push(value);
            }
        }

        BatchOutcome {
            index,
            accumulator,
            clamped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn check_parameters(&self) -> EngineResult<()> {
        let config = &self.config;
        if config.horizon == 0 {
            return Err(EngineError::invalid_parameter("horizon", "must be positive"));
        }
        if config.sample_count == 0 {
            return Err(EngineError::invalid_parameter(
                "sample_count",
                "must be positive",
            ));
        }
        if config.batch_size == 0 {
            return Err(EngineError::invalid_parameter(
                "batch_size",
                "must be positive",
            ));
        }
        if !(config.environmental_noise_scale.is_finite() && config.environmental_noise_scale >= 0.0)
        {
            return Err(EngineError::invalid_parameter(
                "environmental_noise_scale",
                format!(
                    "must be finite and non-negative, got {}",
                    config.environmental_noise_scale
                ),
            ));
        }
        Ok(())
    }

    /// Draws `sample_count` parameter vectors from `posterior` and folds
    /// their trajectories into per-period accumulators.
    ///
    /// Returns `Cancelled` only when cancellation arrives before any batch
    /// finished; later cancellations yield a run with `completed == false`.
    #[instrument(
        skip_all,
        fields(config = %configuration.config_id, samples = self.config.sample_count, horizon = self.config.horizon)
    )]
    pub fn run(
        &self,
        posterior: &StatePosterior,
        configuration: &Configuration,
        cancel: &CancellationToken,
    ) -> EngineResult<SimulationRun> {
        self.check_parameters()?;
        let seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
        self.execute(posterior, configuration, cancel, seed, None)
    }

    /// Continues a partial run with the samples it has not drawn yet, using
    /// its seed and requested sample count. The result is the run that would
    /// have been produced without the interruption.
    #[instrument(
        skip_all,
        fields(config = %configuration.config_id, resume_at = previous.next_sample())
    )]
    pub fn resume(
        &self,
        posterior: &StatePosterior,
        configuration: &Configuration,
        previous: &SimulationRun,
        cancel: &CancellationToken,
    ) -> EngineResult<SimulationRun> {
        self.check_parameters()?;
        if previous.horizon != self.config.horizon {
            return Err(EngineError::invalid_parameter(
                "horizon",
                format!(
                    "partial run covers {} periods, engine is configured for {}",
                    previous.horizon, self.config.horizon
                ),
            ));
        }
        if previous.completed || previous.next_sample() >= previous.requested_samples {
            return Ok(previous.clone());
        }
        self.execute(posterior, configuration, cancel, previous.seed, Some(previous))
    }

    fn execute(
        &self,
        posterior: &StatePosterior,
        configuration: &Configuration,
        cancel: &CancellationToken,
        seed: u64,
        previous: Option<&SimulationRun>,
    ) -> EngineResult<SimulationRun> {
        configuration.check()?;
        let sampler = ParameterSampler::new(posterior)?;

        let (first_sample, sample_count) = previous.map_or((0, self.config.sample_count), |run| {
            (run.next_sample(), run.requested_samples)
        });
        let plan = RunPlan {
            sampler,
            configuration,
            seed,
            horizon: self.config.horizon,
            first_sample,
            sample_count,
            batch_size: self.config.batch_size,
            noise_scale: self.config.environmental_noise_scale,
            scale: configuration.trajectory_scale(),
            threshold: configuration.target_value(),
        };
        let batches = plan.batch_count();
        let workers = self.config.workers.clamp(1, batches.max(1));
        info!(seed, first_sample, batches, workers, "Starting simulation run");

        let started = Instant::now();
        let mut outcomes = run_batches(&plan, workers, cancel);
        outcomes.sort_unstable_by_key(|outcome| outcome.index);

        let clamped_samples = previous.map_or(0, |run| run.clamped_samples)
            + outcomes.iter().map(|o| o.clamped).sum::<usize>();
        let mut outcomes = outcomes.into_iter().map(|outcome| outcome.accumulator);
        let initial = match previous {
            Some(run) => run.accumulator.clone(),
            None => match outcomes.next() {
                Some(first) => first,
                None => {
                    warn!("Simulation cancelled before any batch completed");
                    return Err(EngineError::Cancelled { processed: 0 });
                }
            },
        };
        let accumulator = outcomes.try_fold(initial, |acc, batch| acc.merge(&batch))?;

        let effective_sample_count = accumulator.sample_count() as usize;
        let completed = effective_sample_count == plan.sample_count;
        if completed {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Simulation run complete"
            );
        } else {
            warn!(
                processed = effective_sample_count,
                requested = plan.sample_count,
                "Simulation cancelled; returning partial accumulators"
            );
        }
        if clamped_samples > 0 {
            warn!(clamped_samples, "Samples clamped to the parameter floor");
        }

        Ok(SimulationRun {
            seed,
            requested_samples: plan.sample_count,
            effective_sample_count,
            completed,
            clamped_samples,
            horizon: plan.horizon,
            accumulator,
        })
    }
}

fn run_batches(
    plan: &RunPlan<'_>,
    workers: usize,
    cancel: &CancellationToken,
) -> Vec<BatchOutcome> {
    let batches = plan.batch_count();
    let next_batch = AtomicUsize::new(0);
    let (tx, rx) = channel::unbounded::<BatchOutcome>();

    let scoped = crossbeam::thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let next_batch = &next_batch;
            scope.spawn(move |_| {
                while !cancel.is_cancelled() {
                    let index = next_batch.fetch_add(1, Ordering::Relaxed);
                    if index >= batches {
                        break;
                    }
                    if tx.send(plan.simulate_batch(index)).is_err() {
                        break;
                    }
                }
                debug!(worker, "Worker finished");
            });
        }
    });
    drop(tx);
    if let Err(panic) = scoped {
        std::panic::resume_unwind(panic);
    }

    rx.try_iter().collect()
}
