use geo_types::Coord;
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// Where one cluster sits, for cross-tile reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCentroid {
    pub owner: String,
    /// Tile (or region) the cluster was built in.
    pub partition: usize,
    pub centroid: Coord<f64>,
}

/// Disjoint-set forest. The root of every set is its smallest member.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        true
    }
}

/// Unifies one owner's clusters that were built independently in different
/// partitions but whose centroids lie within `max_merge_distance`.
#[derive(Debug, Clone)]
pub struct CrossRegionMerger {
    max_merge_distance: f64,
}

impl CrossRegionMerger {
    pub fn new(max_merge_distance: f64) -> Self {
        Self { max_merge_distance }
    }

    /// Returns, for each input cluster, the index of the cluster it merges into.
    ///
    /// Merging is transitive: a chain `a ~ b ~ c` collapses onto a single
    /// representative even when `a` and `c` are far apart. The representative
    /// is always the smallest index in its group, so relabeling is stable
    /// regardless of the order pairs are discovered in.
    pub fn merge(&self, clusters: &[ClusterCentroid]) -> Vec<usize> {
        let mut sets = UnionFind::new(clusters.len());
        if clusters.len() < 2 || self.max_merge_distance < 0.0 {
            return (0..clusters.len()).collect();
        }

        let tree = RTree::bulk_load(
            clusters
                .iter()
                .enumerate()
                .map(|(i, c)| GeomWithData::new([c.centroid.x, c.centroid.y], i))
                .collect(),
        );
        let max_d2 = self.max_merge_distance * self.max_merge_distance;

        let mut merges = 0;
        for (i, cluster) in clusters.iter().enumerate() {
            let query = [cluster.centroid.x, cluster.centroid.y];
            for candidate in tree.locate_within_distance(query, max_d2) {
                let j = candidate.data;
                if j <= i {
                    continue;
                }
                let other = &clusters[j];
                if other.owner != cluster.owner || other.partition == cluster.partition {
                    continue;
                }
                if sets.union(i, j) {
                    merges += 1;
                }
            }
        }

        if merges > 0 {
            debug!("Cross-region merge joined {} cluster pairs", merges);
        }
        (0..clusters.len()).map(|i| sets.find(i)).collect()
    }
}
