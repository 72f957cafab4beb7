use geo::{Distance, Euclidean};
use geo_types::Polygon;

use crate::utils::parallel::map_range;

/// Symmetric matrix of minimum boundary distances between polygons.
///
/// Entries are zero on the diagonal and for touching or overlapping pairs.
/// Stored row-major; built fresh per owner group and dropped after clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn from_polygons(polygons: &[Polygon<f64>]) -> Self {
        let n = polygons.len();

        // Upper triangle per row; rows are independent so they can run in parallel.
        let upper: Vec<Vec<f64>> = map_range(n, |i| {
            ((i + 1)..n)
                .map(|j| Euclidean.distance(&polygons[i], &polygons[j]))
                .collect()
        });

        let mut data = vec![0.0; n * n];
        for (i, row) in upper.into_iter().enumerate() {
            for (offset, d) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }

        Self { n, data }
    }

    /// Builds a matrix from explicit rows. Used for precomputed distances.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        Some(Self {
            n,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// True when every pair touches, i.e. the owner's parcels form one contiguous block.
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|d| *d == 0.0)
    }

    /// Rows whose entries are all finite and non-negative.
    pub fn valid_sample_count(&self) -> usize {
        (0..self.n)
            .filter(|&i| self.row(i).iter().all(|d| d.is_finite() && *d >= 0.0))
            .count()
    }

    /// Distance from sample `i` to its k-th nearest other sample, if it has that many.
    pub fn kth_neighbor_distance(&self, i: usize, k: usize) -> Option<f64> {
        if k == 0 {
            return Some(0.0);
        }
        let mut others: Vec<f64> = self
            .row(i)
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, d)| *d)
            .collect();
        if others.len() < k {
            return None;
        }
        others.sort_by(f64::total_cmp);
        Some(others[k - 1])
    }

    /// Indices within `eps` of sample `i`, including `i` itself.
    pub fn neighbors_within(&self, i: usize, eps: f64) -> Vec<usize> {
        self.row(i)
            .iter()
            .enumerate()
            .filter(|(_, d)| **d <= eps)
            .map(|(j, _)| j)
            .collect()
    }
}
