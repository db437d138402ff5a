//! ## erw-simulator::sketch
//! **Bounded-memory quantile sketch**
//!
//! A merging digest: values land in an insertion buffer, buffers are folded
//! into a sorted list of weighted centroids, and adjacent centroids are
//! merged under a size bound that is tight at the tails and loose around
//! the median. Below `capacity` distinct values the sketch is exact and
//! quantiles match linear interpolation between order statistics.
//!
//! Merging two sketches sorts the union of their centroids before
//! compressing, so `merge(a, b)` and `merge(b, a)` produce identical state.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Centroids retained after compression.
pub const DEFAULT_SKETCH_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Centroid {
    mean: f64,
    weight: u64,
}

impl Centroid {
    fn absorb(self, other: Centroid) -> Centroid {
        let weight = self.weight + other.weight;
        let mean = (self.mean * self.weight as f64 + other.mean * other.weight as f64)
            / weight as f64;
        Centroid { mean, weight }
    }
}

fn centroid_order(a: &Centroid, b: &Centroid) -> Ordering {
    a.mean.total_cmp(&b.mean).then(a.weight.cmp(&b.weight))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSketch {
    capacity: usize,
    centroids: Vec<Centroid>,
    buffer: Vec<f64>,
    count: u64,
}

impl Default for QuantileSketch {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SKETCH_CAPACITY)
    }
}

impl QuantileSketch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            centroids: Vec::new(),
            buffer: Vec::with_capacity(capacity),
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn insert(&mut self, value: f64) {
        self.buffer.push(value);
        self.count += 1;
        if self.buffer.len() >= self.capacity {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let mut merged = std::mem::take(&mut self.centroids);
        merged.extend(self.buffer.drain(..).map(|mean| Centroid { mean, weight: 1 }));
        merged.sort_by(centroid_order);
        compress(&mut merged, self.capacity);
        self.centroids = merged;
    }

    /// Union of both sketches' samples.
    pub fn merge(&self, other: &QuantileSketch) -> QuantileSketch {
        let capacity = self.capacity.min(other.capacity);
        let mut centroids: Vec<Centroid> = self
            .centroids
            .iter()
            .chain(other.centroids.iter())
            .copied()
            .chain(
                self.buffer
                    .iter()
                    .chain(other.buffer.iter())
                    .map(|&mean| Centroid { mean, weight: 1 }),
            )
            .collect();
        centroids.sort_by(centroid_order);
        compress(&mut centroids, capacity);
        QuantileSketch {
            capacity,
            centroids,
            buffer: Vec::with_capacity(capacity),
            count: self.count + other.count,
        }
    }

    /// Sorted centroids including pending buffer values, without mutating.
    fn view(&self) -> Vec<Centroid> {
        if self.buffer.is_empty() {
            return self.centroids.clone();
        }
        let mut view = self.centroids.clone();
        view.extend(self.buffer.iter().map(|&mean| Centroid { mean, weight: 1 }));
        view.sort_by(centroid_order);
        compress(&mut view, self.capacity);
        view
    }

    /// Estimate of the `q`-quantile, `q` in `[0, 1]`. `None` when empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let q = q.clamp(0.0, 1.0);
        let view = self.view();
        let rank = q * (self.count - 1) as f64;

        // Each centroid sits at the centre of the ranks it covers.
        let mut cumulative = 0.0;
        let mut previous: Option<(f64, f64)> = None;
        for centroid in &view {
            let centre = cumulative + (centroid.weight as f64 - 1.0) / 2.0;
            if rank <= centre {
                return Some(match previous {
                    None => centroid.mean,
                    Some((prev_centre, prev_mean)) => {
                        let fraction = (rank - prev_centre) / (centre - prev_centre);
                        prev_mean + fraction * (centroid.mean - prev_mean)
                    }
                });
            }
            previous = Some((centre, centroid.mean));
            cumulative += centroid.weight as f64;
        }
        previous.map(|(_, mean)| mean)
    }
}

/// Merges adjacent centroids until at most `capacity` remain.
fn compress(centroids: &mut Vec<Centroid>, capacity: usize) {
    if centroids.len() <= capacity {
        return;
    }
    let total: f64 = centroids.iter().map(|c| c.weight as f64).sum();
    let mut scale = 2.0;
    loop {
        let mut out = Vec::with_capacity(capacity);
        let mut cumulative = 0.0;
        let mut current = centroids[0];
        for &next in &centroids[1..] {
            let merged_weight = (current.weight + next.weight) as f64;
            let q = (cumulative + merged_weight / 2.0) / total;
            let limit = (scale * 4.0 * total * q * (1.0 - q) / capacity as f64).max(1.0);
            if merged_weight <= limit {
                current = current.absorb(next);
            } else {
                cumulative += current.weight as f64;
                out.push(current);
                current = next;
            }
        }
        out.push(current);
        if out.len() <= capacity {
            *centroids = out;
            return;
        }
        scale *= 2.0;
    }
}
