/*!
# ERW Simulator

Monte Carlo forecasting of weathering CO₂ removal from a posterior snapshot.

## Key Components:
- **Sampling:** Posterior draws with per-sample ChaCha8 streams and bounded resampling.
- **Engine:** Batched, cancellable parallel runs that are deterministic for a given seed.
- **Accumulators:** Streaming per-period mean, variance, extrema and target hits.
- **Quantile Sketch:** Bounded-memory percentile estimates that merge across workers.
- **Aggregator:** Period summaries, target attainment and the final report.
*/

pub mod accumulator;
pub mod aggregator;
pub mod cancel;
pub mod engine;
pub mod sampling;
pub mod sketch;

pub use accumulator::{ForecastAccumulator, PeriodAccumulator};
pub use aggregator::{PeriodSummary, SimulationReport};
pub use cancel::CancellationToken;
pub use engine::{SimulationEngine, SimulationRun};
pub use sketch::QuantileSketch;
