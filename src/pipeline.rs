//! The single entry point: parcels of one region in, super-parcels out.

use std::collections::{BTreeMap, BTreeSet};

use geo::Centroid;
use geo_types::{Coord, MultiPolygon, Polygon};
use log::{debug, error, info};

use crate::cluster::{OwnerClusterer, OwnerClusters, MIN_CLUSTERABLE};
use crate::config::{EpsilonStrategy, SuperParcelConfig};
use crate::distance::DistanceMatrix;
use crate::epsilon::AdaptiveEpsilonEstimator;
use crate::error::Result;
use crate::filter::{InvalidGeometryFilter, RejectedSuperParcel, RejectionReason};
use crate::merge::{ClusterCentroid, CrossRegionMerger};
use crate::overlap::OverlapResolver;
use crate::parcel::{Parcel, ParcelId};
use crate::partition::RegionPartitioner;
use crate::superparcel::{ClusterKey, SuperParcel, SuperParcelBuilder};
use crate::utils::parallel::{map_collect, map_range};

/// Everything one region run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperParcelOutput {
    /// Sorted by `sp_id`.
    pub superparcels: Vec<SuperParcel>,
    pub rejected: Vec<RejectedSuperParcel>,
    /// Parcels that joined no super-parcel, ascending.
    pub singles: Vec<ParcelId>,
}

/// Aggregates the parcels of `region_code` into super-parcels.
///
/// Parcels of other regions are ignored. Returns `Ok(None)` when the region
/// yields no super-parcel at all, which is a normal outcome. The only error is
/// an invalid configuration; per-owner failures are logged and their parcels
/// reported as singles.
pub fn build_superparcels(
    parcels: &[Parcel],
    region_code: &str,
    config: &SuperParcelConfig,
) -> Result<Option<SuperParcelOutput>> {
    config.validate()?;

    let region: Vec<&Parcel> = parcels
        .iter()
        .filter(|p| p.region_code() == region_code)
        .collect();
    if region.is_empty() {
        info!("Region {}: no parcels", region_code);
        return Ok(None);
    }

    Ok(RegionRun::new(region_code, region, config).execute())
}

struct BuiltCluster {
    key: ClusterKey,
    /// Indices into the region's parcels, ascending.
    members: Vec<usize>,
    distance: f64,
    rows: Vec<SuperParcel>,
}

#[derive(Default)]
struct TileOutcome {
    clusters: Vec<BuiltCluster>,
    singles: Vec<ParcelId>,
}

struct RegionRun<'a> {
    region_code: &'a str,
    parcels: Vec<&'a Parcel>,
    config: &'a SuperParcelConfig,
    estimator: AdaptiveEpsilonEstimator,
    clusterer: OwnerClusterer,
    builder: SuperParcelBuilder,
}

impl<'a> RegionRun<'a> {
    fn new(region_code: &'a str, parcels: Vec<&'a Parcel>, config: &'a SuperParcelConfig) -> Self {
        Self {
            region_code,
            parcels,
            config,
            estimator: AdaptiveEpsilonEstimator::new(config.knn.clone()),
            clusterer: OwnerClusterer::new(config.min_samples),
            builder: SuperParcelBuilder::new(config.min_samples),
        }
    }

    fn execute(&self) -> Option<SuperParcelOutput> {
        let centroids: Vec<Coord<f64>> = map_collect(&self.parcels, |p| p.centroid());
        let assignment = RegionPartitioner::new(self.config.tiling.clone()).partition(&centroids);
        let tiles = assignment.tiles();
        info!(
            "Region {}: {} parcels in {} tiles",
            self.region_code,
            self.parcels.len(),
            tiles.len()
        );

        let outcomes = map_range(tiles.len(), |t| self.process_tile(t, &tiles[t]));

        let mut clusters = Vec::new();
        let mut singles = Vec::new();
        for outcome in outcomes {
            clusters.extend(outcome.clusters);
            singles.extend(outcome.singles);
        }

        let clusters = self.reconcile(clusters, &mut singles);
        let cluster_count = clusters.len();
        let mut rows: Vec<SuperParcel> = clusters.into_iter().flat_map(|c| c.rows).collect();
        info!(
            "Region {}: built {} rows from {} clusters",
            self.region_code,
            rows.len(),
            cluster_count
        );

        let mut rejected = Vec::new();
        if let Some(min_area) = self.config.min_area {
            let (keep, small): (Vec<_>, Vec<_>) = rows
                .into_iter()
                .partition(|r| r.geometry.is_empty() || r.area() >= min_area);
            if !small.is_empty() {
                debug!("{} rows below minimum area {}", small.len(), min_area);
            }
            rejected.extend(small.into_iter().map(|superparcel| RejectedSuperParcel {
                superparcel,
                reason: RejectionReason::BelowMinimumArea,
            }));
            rows = keep;
        }

        let rows = OverlapResolver::new().resolve(rows);
        let (mut superparcels, invalid) = InvalidGeometryFilter::new().filter(rows);
        rejected.extend(invalid);

        superparcels.sort_by(|a, b| a.sp_id.cmp(&b.sp_id));
        singles.sort_unstable();
        singles.dedup();

        if superparcels.is_empty() {
            info!("Region {}: no super-parcels produced", self.region_code);
            return None;
        }
        info!(
            "Region {}: {} super-parcels, {} rejected, {} singles",
            self.region_code,
            superparcels.len(),
            rejected.len(),
            singles.len()
        );
        Some(SuperParcelOutput {
            superparcels,
            rejected,
            singles,
        })
    }

    fn process_tile(&self, tile: usize, indices: &[usize]) -> TileOutcome {
        let tile_eps = match self.config.epsilon {
            EpsilonStrategy::AdaptivePerTile => {
                let points: Vec<Coord<f64>> =
                    indices.iter().map(|&i| self.parcels[i].centroid()).collect();
                Some(self.estimator.estimate_from_points(&points))
            }
            _ => None,
        };

        let mut owners: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for &i in indices {
            owners.entry(self.parcels[i].owner()).or_default().push(i);
        }
        debug!("Tile {}: {} parcels, {} owners", tile, indices.len(), owners.len());

        let mut outcome = TileOutcome::default();
        for (owner, members) in owners {
            self.process_owner(tile, owner, &members, tile_eps, &mut outcome);
        }
        outcome
    }

    fn process_owner(
        &self,
        tile: usize,
        owner: &str,
        members: &[usize],
        tile_eps: Option<f64>,
        outcome: &mut TileOutcome,
    ) {
        let ids = |idx: &[usize]| -> Vec<ParcelId> { idx.iter().map(|&i| self.parcels[i].id()).collect() };

        if members.len() < MIN_CLUSTERABLE {
            outcome.singles.extend(ids(members));
            return;
        }

        let polygons: Vec<Polygon<f64>> = members
            .iter()
            .map(|&i| self.parcels[i].geometry().clone())
            .collect();
        let matrix = DistanceMatrix::from_polygons(&polygons);

        let candidates: Vec<f64> = match &self.config.epsilon {
            EpsilonStrategy::Fixed { .. } => {
                let sorted = self.config.sorted_thresholds().unwrap_or_default();
                if self.config.area_ratio_gate.is_some() {
                    sorted
                } else {
                    sorted.into_iter().take(1).collect()
                }
            }
            EpsilonStrategy::AdaptivePerTile => tile_eps.into_iter().collect(),
            EpsilonStrategy::AdaptivePerOwner => vec![self.estimator.estimate_from_matrix(&matrix)],
        };

        for eps in candidates {
            let clusters = match self.clusterer.cluster_matrix(owner, &matrix, eps) {
                Ok(clusters) => clusters,
                Err(e) => {
                    error!("Skipping owner {:?} in tile {}: {}", owner, tile, e);
                    outcome.singles.extend(ids(members));
                    return;
                }
            };
            let built = self.build_owner_clusters(tile, owner, members, &clusters);

            if let Some(gate) = self.config.area_ratio_gate {
                let passes = !built.is_empty()
                    && built
                        .iter()
                        .flat_map(|c| c.rows.iter())
                        .all(|r| r.area_ratio >= gate);
                if !passes {
                    debug!("Owner {:?} in tile {}: threshold {} fails area ratio gate {}", owner, tile, eps, gate);
                    continue;
                }
            }

            let clustered: BTreeSet<usize> = built.iter().flat_map(|c| c.members.iter().copied()).collect();
            outcome
                .singles
                .extend(members.iter().filter(|&&i| !clustered.contains(&i)).map(|&i| self.parcels[i].id()));
            outcome.clusters.extend(built);
            return;
        }

        outcome.singles.extend(ids(members));
    }

    fn build_owner_clusters(
        &self,
        tile: usize,
        owner: &str,
        members: &[usize],
        clusters: &OwnerClusters,
    ) -> Vec<BuiltCluster> {
        let mut built = Vec::with_capacity(clusters.clusters.len());
        for (&label, local) in &clusters.clusters {
            let key = ClusterKey {
                owner: owner.to_string(),
                region_code: self.region_code.to_string(),
                tile,
                label,
            };
            let indices: Vec<usize> = local.iter().map(|&l| members[l]).collect();
            let refs: Vec<&Parcel> = indices.iter().map(|&i| self.parcels[i]).collect();
            match self.builder.build(&key, &refs, clusters.eps) {
                Ok(rows) => built.push(BuiltCluster {
                    key,
                    members: indices,
                    distance: clusters.eps,
                    rows,
                }),
                Err(e) => error!("Failed to build cluster {}: {}", key.cluster_id(), e),
            }
        }
        built
    }

    fn cluster_centroid(&self, cluster: &BuiltCluster) -> Coord<f64> {
        let footprint = MultiPolygon::new(
            cluster
                .members
                .iter()
                .map(|&i| self.parcels[i].geometry().clone())
                .collect(),
        );
        footprint.centroid().map(|p| p.0).unwrap_or_else(|| {
            let n = cluster.members.len().max(1) as f64;
            let sum = cluster
                .members
                .iter()
                .map(|&i| self.parcels[i].centroid())
                .fold(Coord { x: 0.0, y: 0.0 }, |acc, c| acc + c);
            Coord { x: sum.x / n, y: sum.y / n }
        })
    }

    /// Joins one owner's clusters from different tiles whose centroids are
    /// close, then rebuilds every joined group as a single cluster.
    fn reconcile(&self, clusters: Vec<BuiltCluster>, singles: &mut Vec<ParcelId>) -> Vec<BuiltCluster> {
        let Some(max_distance) = self.config.max_merge_distance else {
            return clusters;
        };
        if clusters.len() < 2 {
            return clusters;
        }

        let centroids: Vec<ClusterCentroid> = clusters
            .iter()
            .map(|c| ClusterCentroid {
                owner: c.key.owner.clone(),
                partition: c.key.tile,
                centroid: self.cluster_centroid(c),
            })
            .collect();
        let reps = CrossRegionMerger::new(max_distance).merge(&centroids);

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &rep) in reps.iter().enumerate() {
            groups.entry(rep).or_default().push(i);
        }
        if groups.len() == clusters.len() {
            return clusters;
        }

        let before = clusters.len();
        let mut slots: Vec<Option<BuiltCluster>> = clusters.into_iter().map(Some).collect();
        let mut result = Vec::with_capacity(groups.len());
        for (rep, group) in groups {
            if group.len() == 1 {
                result.extend(slots[rep].take());
                continue;
            }

            let parts: Vec<BuiltCluster> = group.iter().filter_map(|&i| slots[i].take()).collect();
            let Some(key) = parts.first().map(|c| c.key.clone()) else {
                continue;
            };
            let distance = parts.iter().map(|c| c.distance).fold(0.0, f64::max);
            let mut members: Vec<usize> = parts.iter().flat_map(|c| c.members.iter().copied()).collect();
            members.sort_unstable();
            members.dedup();

            let refs: Vec<&Parcel> = members.iter().map(|&i| self.parcels[i]).collect();
            match self.builder.build(&key, &refs, distance) {
                Ok(rows) => {
                    debug!("Merged {} clusters into {}", parts.len(), key.cluster_id());
                    result.push(BuiltCluster {
                        key,
                        members,
                        distance,
                        rows,
                    });
                }
                Err(e) => {
                    error!("Failed to rebuild merged cluster {}: {}", key.cluster_id(), e);
                    singles.extend(members.iter().map(|&i| self.parcels[i].id()));
                }
            }
        }

        info!("Cross-region merge: {} clusters became {}", before, result.len());
        result
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
