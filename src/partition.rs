//! Spatial tiling of large parcel sets.
//!
//! Tiles keep the per-owner distance matrix small. Partitioning is a
//! k-means over parcel centroids with deterministic Z-order seeding, followed
//! by a greedy merge of undersized tiles into their nearest neighbor tile.

use geo_types::Coord;
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::config::TilingConfig;
use crate::utils::z_order_index;

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

/// Tile label per input point, plus the final centroid of every tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileAssignment {
    pub labels: Vec<usize>,
    pub centroids: Vec<Coord<f64>>,
}

impl TileAssignment {
    pub fn single(n: usize, centroid: Coord<f64>) -> Self {
        Self {
            labels: vec![0; n],
            centroids: vec![centroid],
        }
    }

    pub fn tile_count(&self) -> usize {
        self.centroids.len()
    }

    /// Input indices grouped by tile, in ascending tile order.
    pub fn tiles(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.tile_count()];
        for (i, &label) in self.labels.iter().enumerate() {
            groups[label].push(i);
        }
        groups
    }
}

#[derive(Debug, Clone)]
pub struct RegionPartitioner {
    config: TilingConfig,
}

impl RegionPartitioner {
    pub fn new(config: TilingConfig) -> Self {
        Self { config }
    }

    pub fn tile_count_for(&self, n: usize) -> usize {
        (n / self.config.max_parcels_per_tile.max(1)).max(1)
    }

    pub fn partition(&self, points: &[Coord<f64>]) -> TileAssignment {
        let n = points.len();
        let k = self.tile_count_for(n);
        if k <= 1 || !self.config.enabled {
            return TileAssignment::single(n, mean(points.iter()));
        }

        let (mut labels, mut centroids) = self.kmeans(points, k);
        merge_small_tiles(&mut labels, &centroids, self.config.min_tile_size);

        let (labels, tile_count) = compact_labels(&labels, centroids.len());
        centroids = (0..tile_count)
            .map(|t| mean(tile_points(points, &labels, t)))
            .collect();

        debug!("Partitioned {} parcels into {} tiles", n, centroids.len());
        TileAssignment { labels, centroids }
    }

    fn kmeans(&self, points: &[Coord<f64>], k: usize) -> (Vec<usize>, Vec<Coord<f64>>) {
        let mut centroids = seed_centroids(points, k);
        let mut labels = vec![usize::MAX; points.len()];

        for iteration in 0..self.config.max_iterations.max(1) {
            let tree = RTree::bulk_load(
                centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| IndexedCentroid::new([c.x, c.y], i))
                    .collect(),
            );

            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let nearest = tree
                    .nearest_neighbor(&[p.x, p.y])
                    .map(|c| c.data)
                    .unwrap_or(0);
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }

            if !changed {
                debug!("k-means converged after {} iterations", iteration);
                break;
            }

            let mut sums = vec![(0.0, 0.0, 0usize); k];
            for (p, &label) in points.iter().zip(&labels) {
                let s = &mut sums[label];
                s.0 += p.x;
                s.1 += p.y;
                s.2 += 1;
            }
            for (c, (sx, sy, count)) in centroids.iter_mut().zip(sums) {
                // Empty tiles keep their previous centroid.
                if count > 0 {
                    *c = Coord {
                        x: sx / count as f64,
                        y: sy / count as f64,
                    };
                }
            }
        }

        (labels, centroids)
    }
}

/// Picks `k` seeds spread evenly along the Z-order curve of the input.
fn seed_centroids(points: &[Coord<f64>], k: usize) -> Vec<Coord<f64>> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by_key(|&i| (z_order_index(points[i]), i));
    let n = points.len();
    (0..k)
        .map(|t| points[order[((2 * t + 1) * n) / (2 * k)]])
        .collect()
}

/// Reassigns every tile smaller than `min_size` to the tile with the nearest centroid.
///
/// Tiles are visited in label order. A tile that has grown past `min_size`
/// through earlier merges is left alone, and emptied tiles are never targets.
pub fn merge_small_tiles(labels: &mut [usize], centroids: &[Coord<f64>], min_size: usize) {
    let k = centroids.len();
    if k <= 1 {
        return;
    }
    let mut sizes = vec![0usize; k];
    for &l in labels.iter() {
        sizes[l] += 1;
    }
    let small: Vec<usize> = (0..k).filter(|&t| sizes[t] < min_size).collect();

    for tile in small {
        if sizes[tile] == 0 || sizes[tile] >= min_size {
            continue;
        }
        let origin = centroids[tile];
        let target = (0..k)
            .filter(|&t| t != tile && sizes[t] > 0)
            .min_by(|&a, &b| {
                sq_dist(origin, centroids[a])
                    .total_cmp(&sq_dist(origin, centroids[b]))
                    .then(a.cmp(&b))
            });
        let Some(target) = target else {
            continue;
        };
        for l in labels.iter_mut() {
            if *l == tile {
                *l = target;
            }
        }
        sizes[target] += sizes[tile];
        sizes[tile] = 0;
    }
}

/// Renumbers labels to 0..m in ascending order of the old label. Returns the new labels and m.
fn compact_labels(labels: &[usize], k: usize) -> (Vec<usize>, usize) {
    let mut used = vec![false; k];
    for &l in labels {
        used[l] = true;
    }
    let mut remap = vec![0usize; k];
    let mut next = 0;
    for t in 0..k {
        if used[t] {
            remap[t] = next;
            next += 1;
        }
    }
    (labels.iter().map(|&l| remap[l]).collect(), next)
}

fn tile_points<'a>(
    points: &'a [Coord<f64>],
    labels: &'a [usize],
    tile: usize,
) -> impl Iterator<Item = &'a Coord<f64>> + 'a {
    points
        .iter()
        .zip(labels)
        .filter(move |(_, l)| **l == tile)
        .map(|(p, _)| p)
}

fn mean<'a>(points: impl Iterator<Item = &'a Coord<f64>>) -> Coord<f64> {
    let (sx, sy, n) = points.fold((0.0, 0.0, 0usize), |(sx, sy, n), p| (sx + p.x, sy + p.y, n + 1));
    if n == 0 {
        return Coord { x: 0.0, y: 0.0 };
    }
    Coord {
        x: sx / n as f64,
        y: sy / n as f64,
    }
}

fn sq_dist(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

#[cfg(test)]
#[path = "partition_tests.rs"]
mod tests;
