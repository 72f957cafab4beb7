use crate::distance::DistanceMatrix;

/// Label assigned to one sample by DBSCAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterLabel {
    Outlier,
    Cluster(usize),
}

impl ClusterLabel {
    /// Conventional integer form: `-1` for outliers.
    pub fn as_i64(self) -> i64 {
        match self {
            ClusterLabel::Outlier => -1,
            ClusterLabel::Cluster(id) => id as i64,
        }
    }

    pub fn cluster_id(self) -> Option<usize> {
        match self {
            ClusterLabel::Outlier => None,
            ClusterLabel::Cluster(id) => Some(id),
        }
    }
}

/// DBSCAN over a precomputed distance matrix.
///
/// A sample is a core sample when at least `min_samples` samples (itself
/// included) lie within `eps`. Clusters grow from core samples in index
/// order; a border sample joins the first cluster that reaches it. The result
/// is fully determined by the matrix, `eps` and `min_samples`.
pub fn dbscan(matrix: &DistanceMatrix, eps: f64, min_samples: usize) -> Vec<ClusterLabel> {
    let n = matrix.len();
    let neighborhoods: Vec<Vec<usize>> = (0..n).map(|i| matrix.neighbors_within(i, eps)).collect();
    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|nb| nb.len() >= min_samples)
        .collect();

    let mut labels = vec![ClusterLabel::Outlier; n];
    let mut assigned = vec![false; n];
    let mut next_id = 0;

    for seed in 0..n {
        if assigned[seed] || !is_core[seed] {
            continue;
        }

        let id = next_id;
        next_id += 1;

        let mut stack = vec![seed];
        assigned[seed] = true;
        labels[seed] = ClusterLabel::Cluster(id);

        while let Some(current) = stack.pop() {
            if !is_core[current] {
                continue;
            }
            for &neighbor in &neighborhoods[current] {
                if assigned[neighbor] {
                    continue;
                }
                assigned[neighbor] = true;
                labels[neighbor] = ClusterLabel::Cluster(id);
                stack.push(neighbor);
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_matrix(xs: &[f64]) -> DistanceMatrix {
        DistanceMatrix::from_rows(
            xs.iter()
                .map(|a| xs.iter().map(|b| (a - b).abs()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let m = line_matrix(&[0.0, 1.0, 2.0, 50.0, 51.0, 52.0, 500.0]);
        let labels = dbscan(&m, 1.5, 3);
        assert_eq!(
            labels,
            vec![
                ClusterLabel::Cluster(0),
                ClusterLabel::Cluster(0),
                ClusterLabel::Cluster(0),
                ClusterLabel::Cluster(1),
                ClusterLabel::Cluster(1),
                ClusterLabel::Cluster(1),
                ClusterLabel::Outlier,
            ]
        );
    }

    #[test]
    fn test_chain_is_transitive() {
        // Each point reaches only its direct neighbors, but the chain forms one cluster.
        let m = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let labels = dbscan(&m, 1.0, 3);
        assert!(labels.iter().all(|l| *l == ClusterLabel::Cluster(0)));
    }

    #[test]
    fn test_border_sample_joins_first_cluster() {
        // Sample 3 sits between two dense groups but is not itself core.
        let m = line_matrix(&[0.0, 0.5, 1.0, 2.0, 3.0, 3.5, 4.0]);
        let labels = dbscan(&m, 1.0, 4);
        assert_eq!(labels[3], ClusterLabel::Cluster(0));
        assert_eq!(labels[4], ClusterLabel::Cluster(1));
    }

    #[test]
    fn test_label_conversions() {
        assert_eq!(ClusterLabel::Outlier.as_i64(), -1);
        assert_eq!(ClusterLabel::Cluster(4).as_i64(), 4);
        assert_eq!(ClusterLabel::Outlier.cluster_id(), None);
    }
}
