use geo::algorithm::buffer::{Buffer, BufferStyle, LineJoin};
use geo::{unary_union, Area};
use geo_types::{MultiPolygon, Polygon};
use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::error::{Result, SuperParcelError};
use crate::geometry::{compute_miter_limit, ParcelGeometry, AREA_EPSILON};
use crate::parcel::{Parcel, ParcelId};

/// Relative slack taken off the minimum miter angle so the sharpest corner of
/// the input is still mitered after floating point rounding.
const MITER_ANGLE_SLACK: f64 = 1e-3;

/// Identity of one cluster: owner, region, tile and the DBSCAN label within that tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub owner: String,
    pub region_code: String,
    pub tile: usize,
    pub label: usize,
}

impl ClusterKey {
    pub fn cluster_id(&self) -> String {
        format!("{}_{}-{}-{}", self.owner, self.region_code, self.tile, self.label)
    }
}

/// A merged footprint of one owner's parcel cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperParcel {
    pub sp_id: String,
    pub cluster_id: String,
    pub owner: String,
    pub region_code: String,
    pub geometry: ParcelGeometry,
    /// Ascending member parcel ids.
    pub member_ids: Vec<ParcelId>,
    pub member_count: usize,
    pub total_member_area: f64,
    /// Area of the whole buffered cluster geometry, before explode.
    pub merged_area: f64,
    pub area_ratio: f64,
    /// The raw dissolve was multi-part before buffering.
    pub cross_boundary: bool,
    pub buffer_distance: f64,
}

impl SuperParcel {
    pub fn cross_boundary_indicator(&self) -> u8 {
        u8::from(self.cross_boundary)
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

/// Content hash of a member set: first 10 hex chars of SHA-256 over the
/// `-`-joined ascending ids. Independent of input order.
pub fn hash_member_ids(ids: &[ParcelId]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let joined = sorted
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("-");
    let digest = Sha256::digest(joined.as_bytes());
    digest.iter().take(5).map(|b| format!("{:02x}", b)).collect()
}

/// Converts a miter length ratio `1/sin(θ/2)` into the minimum corner angle
/// `θ` (radians) that the buffer join expects. Corners sharper than the
/// returned angle are beveled.
pub fn miter_angle(miter_limit: f64) -> f64 {
    let ratio = if miter_limit.is_finite() { miter_limit.max(1.0) } else { 1.0 };
    2.0 * (1.0 / ratio).asin() * (1.0 - MITER_ANGLE_SLACK)
}

/// Grow by `distance` then shrink by the same amount with the same miter limit.
/// Gaps narrower than `2 * distance` are sealed; the outline otherwise returns
/// to where it started.
pub fn close_and_shrink(geom: &ParcelGeometry, distance: f64, miter_limit: f64) -> MultiPolygon<f64> {
    let multi = geom.to_multi();
    if distance <= 0.0 {
        return multi;
    }
    let angle = miter_angle(miter_limit);
    let grown = multi.buffer_with_style(BufferStyle::new(distance).line_join(LineJoin::Miter(angle)));
    grown.buffer_with_style(BufferStyle::new(-distance).line_join(LineJoin::Miter(angle)))
}

/// Turns one cluster of parcels into one or more super-parcel rows.
#[derive(Debug, Clone)]
pub struct SuperParcelBuilder {
    min_samples: usize,
}

impl SuperParcelBuilder {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    /// Dissolves, seals and explodes `members`.
    ///
    /// Every returned row shares the cluster id and member statistics; multi-part
    /// results get `"{hash}-{k}"` ids with parts ordered by bounding-box corner.
    /// A buffer that collapses the geometry yields one row with an empty
    /// geometry so the invalid-geometry filter can report it.
    pub fn build(&self, key: &ClusterKey, members: &[&Parcel], distance: f64) -> Result<Vec<SuperParcel>> {
        self.build_with_id(&key.cluster_id(), &key.owner, &key.region_code, members, distance)
    }

    pub fn build_with_id(
        &self,
        cluster_id: &str,
        owner: &str,
        region_code: &str,
        members: &[&Parcel],
        distance: f64,
    ) -> Result<Vec<SuperParcel>> {
        if members.len() < self.min_samples {
            return Err(SuperParcelError::UndersizedCluster {
                cluster_id: cluster_id.to_string(),
                members: members.len(),
                min_samples: self.min_samples,
            });
        }

        let polygons: Vec<&Polygon<f64>> = members.iter().map(|p| p.geometry()).collect();
        let dissolved = ParcelGeometry::from_multi(unary_union(polygons))
            .ok_or_else(|| SuperParcelError::EmptyDissolve(cluster_id.to_string()))?;

        let cross_boundary = dissolved.is_multi_part();
        let miter_limit = compute_miter_limit(&dissolved);
        let sealed = close_and_shrink(&dissolved, distance, miter_limit);

        let mut member_ids: Vec<ParcelId> = members.iter().map(|p| p.id()).collect();
        member_ids.sort_unstable();
        let base_id = hash_member_ids(&member_ids);
        let total_member_area: f64 = members.iter().map(|p| p.area()).sum();
        let merged_area = sealed.unsigned_area();
        let area_ratio = if merged_area > AREA_EPSILON {
            total_member_area / merged_area
        } else {
            0.0
        };

        debug!(
            "Cluster {}: {} members, {} dissolved parts, miter limit {:.3}, buffer {}",
            cluster_id,
            members.len(),
            dissolved.part_count(),
            miter_limit,
            distance
        );

        let row = |sp_id: String, geometry: ParcelGeometry| SuperParcel {
            sp_id,
            cluster_id: cluster_id.to_string(),
            owner: owner.to_string(),
            region_code: region_code.to_string(),
            geometry,
            member_ids: member_ids.clone(),
            member_count: member_ids.len(),
            total_member_area,
            merged_area,
            area_ratio,
            cross_boundary,
            buffer_distance: distance,
        };

        let Some(sealed) = ParcelGeometry::from_multi(sealed) else {
            warn!("Cluster {} collapsed to an empty geometry after buffering", cluster_id);
            return Ok(vec![row(base_id, ParcelGeometry::Multi(MultiPolygon::new(vec![])))]);
        };

        let parts = sealed.explode();
        if parts.len() == 1 {
            return Ok(parts
                .into_iter()
                .map(|p| row(base_id.clone(), ParcelGeometry::Single(p)))
                .collect());
        }
        Ok(parts
            .into_iter()
            .enumerate()
            .map(|(k, p)| row(format!("{}-{}", base_id, k), ParcelGeometry::Single(p)))
            .collect())
    }
}

#[cfg(test)]
#[path = "superparcel_tests.rs"]
mod tests;
