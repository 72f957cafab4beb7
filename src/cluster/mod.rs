pub mod dbscan;

use std::collections::BTreeMap;

use geo_types::Polygon;
use log::debug;

use crate::distance::DistanceMatrix;
use crate::epsilon::FALLBACK_EPSILON;
use crate::error::{Result, SuperParcelError};

pub use dbscan::{dbscan, ClusterLabel};

/// Owner groups smaller than this are never clustered.
pub const MIN_CLUSTERABLE: usize = 3;

/// Clustering result for one (tile, owner) group. Indices refer to the input slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerClusters {
    /// Per-input label; empty when clustering was skipped.
    pub labels: Vec<ClusterLabel>,
    /// Cluster id to member indices, only clusters of at least `min_samples`.
    pub clusters: BTreeMap<usize, Vec<usize>>,
    /// Indices that belong to no eligible cluster: DBSCAN outliers and low-count clusters.
    pub outliers: Vec<usize>,
    /// Radius actually used.
    pub eps: f64,
}

impl OwnerClusters {
    pub fn is_skipped(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OwnerClusterer {
    min_samples: usize,
}

impl OwnerClusterer {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Builds the distance matrix for `polygons` and clusters it.
    pub fn cluster(&self, owner: &str, polygons: &[Polygon<f64>], eps: f64) -> Result<OwnerClusters> {
        if polygons.len() < MIN_CLUSTERABLE {
            return Ok(OwnerClusters::default());
        }
        let matrix = DistanceMatrix::from_polygons(polygons);
        self.cluster_matrix(owner, &matrix, eps)
    }

    /// Clusters a precomputed matrix.
    ///
    /// Fails with `InsufficientSamples` when any row carries unusable
    /// (non-finite or negative) distances or fewer than `min_samples` rows are usable.
    pub fn cluster_matrix(&self, owner: &str, matrix: &DistanceMatrix, eps: f64) -> Result<OwnerClusters> {
        if matrix.len() < MIN_CLUSTERABLE {
            return Ok(OwnerClusters::default());
        }

        let valid = matrix.valid_sample_count();
        if valid < self.min_samples || valid < matrix.len() {
            let (rows, cols) = matrix.shape();
            return Err(SuperParcelError::InsufficientSamples {
                owner: owner.to_string(),
                rows,
                cols,
                valid,
                required: self.min_samples.max(matrix.len()),
            });
        }

        let eps = if matrix.is_all_zero() { FALLBACK_EPSILON } else { eps };
        let labels = dbscan(matrix, eps, self.min_samples);

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut outliers = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            match label {
                ClusterLabel::Cluster(id) => groups.entry(*id).or_default().push(i),
                ClusterLabel::Outlier => outliers.push(i),
            }
        }

        // Low-count clusters are treated as singles.
        let mut clusters = BTreeMap::new();
        for (id, members) in groups {
            if members.len() >= self.min_samples {
                clusters.insert(id, members);
            } else {
                outliers.extend(members);
            }
        }
        outliers.sort_unstable();

        debug!(
            "Owner {:?}: {} samples, eps {:.3}, {} clusters, {} outliers",
            owner,
            matrix.len(),
            eps,
            clusters.len(),
            outliers.len()
        );

        Ok(OwnerClusters {
            labels,
            clusters,
            outliers,
            eps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::LineString;

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x, y),
                (x + size, y),
                (x + size, y + size),
                (x, y + size),
                (x, y),
            ]),
            vec![],
        )
    }

    fn scenario() -> Vec<Polygon<f64>> {
        // Three 10x10 parcels 5 apart, one 500 away.
        vec![
            square(0.0, 0.0, 10.0),
            square(15.0, 0.0, 10.0),
            square(30.0, 0.0, 10.0),
            square(530.0, 0.0, 10.0),
        ]
    }

    #[test]
    fn test_single_parcel_skips_clustering() {
        let result = OwnerClusterer::new(3)
            .cluster("A", &[square(0.0, 0.0, 1.0)], 10.0)
            .unwrap();
        assert!(result.is_skipped());
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_two_parcels_skip_clustering() {
        let result = OwnerClusterer::new(2)
            .cluster("A", &[square(0.0, 0.0, 1.0), square(1.0, 0.0, 1.0)], 10.0)
            .unwrap();
        assert!(result.is_skipped());
    }

    #[test]
    fn test_outlier_separated_from_cluster() {
        let result = OwnerClusterer::new(3).cluster("A", &scenario(), 10.0).unwrap();
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters.values().next().unwrap(), &vec![0, 1, 2]);
        assert_eq!(result.outliers, vec![3]);
        assert_eq!(result.labels[3], ClusterLabel::Outlier);
    }

    #[test]
    fn test_labels_deterministic() {
        let clusterer = OwnerClusterer::new(3);
        let first = clusterer.cluster("A", &scenario(), 10.0).unwrap();
        for _ in 0..5 {
            assert_eq!(clusterer.cluster("A", &scenario(), 10.0).unwrap(), first);
        }
    }

    #[test]
    fn test_low_count_clusters_fold_into_outliers() {
        let m = DistanceMatrix::from_rows(
            [0.0, 0.5, 1.0, 2.0, 3.0, 3.5, 4.0]
                .iter()
                .map(|a: &f64| {
                    [0.0, 0.5, 1.0, 2.0, 3.0, 3.5, 4.0]
                        .iter()
                        .map(|b: &f64| (a - b).abs())
                        .collect()
                })
                .collect(),
        )
        .unwrap();
        let result = OwnerClusterer::new(4).cluster_matrix("A", &m, 1.0).unwrap();
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[&0], vec![0, 1, 2, 3]);
        assert_eq!(result.outliers, vec![4, 5, 6]);
    }

    #[test]
    fn test_touching_set_forces_unit_eps() {
        // Every pair shares an edge or a corner.
        let touching = vec![
            square(0.0, 0.0, 10.0),
            square(10.0, 0.0, 10.0),
            square(0.0, 10.0, 10.0),
        ];
        let result = OwnerClusterer::new(3).cluster("A", &touching, 250.0).unwrap();
        assert_eq!(result.eps, FALLBACK_EPSILON);
        assert_eq!(result.clusters[&0], vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_samples_are_reported_with_shape() {
        let m = DistanceMatrix::from_rows(vec![
            vec![0.0, 1.0, f64::NAN],
            vec![1.0, 0.0, 1.0],
            vec![f64::NAN, 1.0, 0.0],
        ])
        .unwrap();
        let err = OwnerClusterer::new(3).cluster_matrix("OWNER X", &m, 2.0).unwrap_err();
        match err {
            SuperParcelError::InsufficientSamples { owner, rows, cols, valid, .. } => {
                assert_eq!(owner, "OWNER X");
                assert_eq!((rows, cols), (3, 3));
                assert_eq!(valid, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
