//! Density-driven choice of the DBSCAN radius.
//!
//! The k-th nearest neighbor distance of every sample is sorted, smoothed with
//! a moving average, and the radius is read off at the point where the smoothed
//! curve rises fastest (the "elbow").

use geo_types::Coord;
use log::{debug, warn};
use rstar::RTree;

use crate::config::KnnConfig;
use crate::distance::DistanceMatrix;

/// Radius returned whenever the curve is too short or degenerate.
pub const FALLBACK_EPSILON: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct AdaptiveEpsilonEstimator {
    config: KnnConfig,
}

impl AdaptiveEpsilonEstimator {
    pub fn new(config: KnnConfig) -> Self {
        Self { config }
    }

    /// Estimates from sample points (typically parcel centroids).
    pub fn estimate_from_points(&self, points: &[Coord<f64>]) -> f64 {
        let distances = knn_distances_from_points(points, self.config.k_neighbors);
        self.estimate_from_kth_distances(distances)
    }

    /// Estimates from a precomputed boundary distance matrix.
    ///
    /// A matrix of all zeros (every parcel touches every other) forces the fallback radius.
    pub fn estimate_from_matrix(&self, matrix: &DistanceMatrix) -> f64 {
        if matrix.is_all_zero() {
            debug!("All pairwise distances are zero, using fallback epsilon");
            return FALLBACK_EPSILON;
        }
        let k = effective_k(self.config.k_neighbors, matrix.len());
        let distances = (0..matrix.len())
            .filter_map(|i| matrix.kth_neighbor_distance(i, k))
            .collect();
        self.estimate_from_kth_distances(distances)
    }

    fn estimate_from_kth_distances(&self, mut distances: Vec<f64>) -> f64 {
        distances.sort_by(f64::total_cmp);

        let window = (self.config.smoothing_window * distances.len() as f64).ceil() as usize;
        let smoothed = moving_average(&distances, window.max(1));

        let raw = elbow_value(&smoothed);
        let eps = match self.config.clamp {
            Some(clamp) => clamp.apply(raw),
            None => raw,
        };
        debug!(
            "Estimated epsilon {:.3} (raw elbow {:.3}) from {} samples",
            eps,
            raw,
            smoothed.len()
        );
        eps
    }
}

/// Samples that have fewer than k other samples use their farthest neighbor instead.
fn effective_k(k: usize, n: usize) -> usize {
    k.min(n.saturating_sub(1))
}

fn knn_distances_from_points(points: &[Coord<f64>], k: usize) -> Vec<f64> {
    let k = effective_k(k, points.len());
    if k == 0 {
        return vec![0.0; points.len()];
    }

    let tree = RTree::bulk_load(points.iter().map(|c| [c.x, c.y]).collect::<Vec<_>>());
    points
        .iter()
        .map(|c| {
            let query = [c.x, c.y];
            // The first hit is the point itself (distance 0), so take k + 1.
            tree.nearest_neighbor_iter_with_distance_2(&query)
                .nth(k)
                .map(|(_, d2)| d2.sqrt())
                .unwrap_or(f64::INFINITY)
        })
        .collect()
}

/// Centered moving average with half-sample-symmetric reflection at both ends.
/// For an even window the extra sample sits on the left, matching the usual
/// `uniform_filter1d` convention.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || window <= 1 {
        return values.to_vec();
    }
    let left = (window / 2) as isize;

    (0..n as isize)
        .map(|i| {
            let start = i - left;
            let sum: f64 = (start..start + window as isize)
                .map(|idx| values[reflect_index(idx, n)])
                .sum();
            sum / window as f64
        })
        .collect()
}

fn reflect_index(idx: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut m = idx.rem_euclid(period);
    if m >= n {
        m = period - 1 - m;
    }
    m as usize
}

/// Smoothed value at `argmax(diff) + 1`, or the fallback for short or degenerate curves.
pub fn elbow_value(smoothed: &[f64]) -> f64 {
    if smoothed.len() < 3 {
        warn!(
            "Only {} samples available for elbow detection, using fallback epsilon",
            smoothed.len()
        );
        return FALLBACK_EPSILON;
    }

    let mut best_idx = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (i, w) in smoothed.windows(2).enumerate() {
        let d = w[1] - w[0];
        // Strict comparison keeps the first maximum.
        if d > best_diff {
            best_diff = d;
            best_idx = i;
        }
    }

    let value = smoothed[best_idx + 1];
    if value.is_infinite() || value.is_nan() || value <= 0.0 {
        warn!("Degenerate elbow value {}, using fallback epsilon", value);
        return FALLBACK_EPSILON;
    }
    value
}

#[cfg(test)]
#[path = "epsilon_tests.rs"]
mod tests;
