use geo::{Area, BooleanOps, Intersects};
use geo_types::MultiPolygon;
use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{ParcelGeometry, AREA_EPSILON};
use crate::superparcel::SuperParcel;
use crate::utils::parallel::map_range;

// Bounding box of one super-parcel, indexable by rstar
struct IndexedFootprint {
    envelope: AABB<[f64; 2]>,
    index: usize,
}

impl RTreeObject for IndexedFootprint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn footprint_envelope(geometry: &ParcelGeometry) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|r| AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]))
}

/// Removes pairwise overlaps between independently built super-parcels.
///
/// Rows are ranked by ascending area, ties broken by `sp_id` and then input
/// position. Each row loses every lower-ranked row it intersects, measured on
/// the geometries as they were before any clipping, so the smaller footprint
/// always keeps the contested area and the outcome never depends on iteration
/// order. Rows that clip away entirely are dropped.
#[derive(Debug, Clone, Default)]
pub struct OverlapResolver;

impl OverlapResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, rows: Vec<SuperParcel>) -> Vec<SuperParcel> {
        if rows.len() < 2 {
            return rows;
        }

        let areas: Vec<f64> = rows.iter().map(|r| r.area()).collect();
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            areas[a]
                .total_cmp(&areas[b])
                .then_with(|| rows[a].sp_id.cmp(&rows[b].sp_id))
                .then(a.cmp(&b))
        });
        let mut rank = vec![0usize; rows.len()];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }

        let indexed: Vec<IndexedFootprint> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                footprint_envelope(&row.geometry).map(|envelope| IndexedFootprint { envelope, index })
            })
            .collect();
        let tree = RTree::bulk_load(indexed);

        // None: untouched. Some(None): clipped away entirely.
        let clipped = map_range(rows.len(), |i| -> Option<Option<ParcelGeometry>> {
            let envelope = footprint_envelope(&rows[i].geometry)?;
            let current = rows[i].geometry.to_multi();

            let mut blockers: Vec<usize> = tree
                .locate_in_envelope_intersecting(&envelope)
                .map(|cand| cand.index)
                .filter(|&j| rank[j] < rank[i])
                .filter(|&j| rows[j].geometry.to_multi().intersects(&current))
                .collect();
            if blockers.is_empty() {
                return None;
            }
            blockers.sort_unstable_by_key(|&j| rank[j]);

            let remaining = blockers.iter().fold(current, |acc: MultiPolygon<f64>, &j| {
                acc.difference(&rows[j].geometry.to_multi())
            });
            // Edge-only contact
            if (remaining.unsigned_area() - areas[i]).abs() <= AREA_EPSILON * areas[i].max(1.0) {
                return None;
            }
            Some(ParcelGeometry::from_multi(remaining))
        });

        let mut kept = Vec::with_capacity(rows.len());
        let mut clipped_count = 0;
        for (mut row, outcome) in rows.into_iter().zip(clipped) {
            match outcome {
                None => kept.push(row),
                Some(Some(geometry)) => {
                    clipped_count += 1;
                    debug!(
                        "Clipped {} from {:.3} to {:.3}",
                        row.sp_id,
                        row.area(),
                        geometry.unsigned_area()
                    );
                    row.geometry = geometry;
                    kept.push(row);
                }
                Some(None) => {
                    warn!("Dropping {} ({}): fully covered by smaller super-parcels", row.sp_id, row.cluster_id);
                }
            }
        }

        info!(
            "Overlap removal: {} clipped, {} kept of {}",
            clipped_count,
            kept.len(),
            areas.len()
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Polygon};

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

    fn row(sp_id: &str, polygon: Polygon<f64>) -> SuperParcel {
        SuperParcel {
            sp_id: sp_id.to_string(),
            cluster_id: format!("{}-cluster", sp_id),
            owner: "A".into(),
            region_code: "06001".into(),
            geometry: ParcelGeometry::Single(polygon),
            member_ids: vec![1, 2, 3],
            member_count: 3,
            total_member_area: 0.0,
            merged_area: 0.0,
            area_ratio: 0.0,
            cross_boundary: false,
            buffer_distance: 1.0,
        }
    }

    fn overlap_area(a: &SuperParcel, b: &SuperParcel) -> f64 {
        a.geometry
            .to_multi()
            .intersection(&b.geometry.to_multi())
            .unsigned_area()
    }

    #[test]
    fn test_smaller_polygon_keeps_contested_area() {
        let rows = vec![row("big", square(0.0, 0.0, 10.0)), row("small", square(8.0, 0.0, 4.0))];
        let out = OverlapResolver::new().resolve(rows);
        assert_eq!(out.len(), 2);
        let big = out.iter().find(|r| r.sp_id == "big").unwrap();
        let small = out.iter().find(|r| r.sp_id == "small").unwrap();
        assert!((small.area() - 16.0).abs() < 1e-6);
        assert!((big.area() - 92.0).abs() < 1e-6);
        assert!(overlap_area(big, small) < 1e-6);
    }

    #[test]
    fn test_three_way_overlap_leaves_no_intersections() {
        let rows = vec![
            row("a", square(0.0, 0.0, 10.0)),
            row("b", square(5.0, 5.0, 9.0)),
            row("c", square(3.0, 2.0, 8.0)),
        ];
        let out = OverlapResolver::new().resolve(rows);
        assert_eq!(out.len(), 3);
        for i in 0..out.len() {
            for j in (i + 1)..out.len() {
                assert!(overlap_area(&out[i], &out[j]) < 1e-6, "{} and {} overlap", out[i].sp_id, out[j].sp_id);
            }
        }
        // The smallest footprint is never clipped.
        let c = out.iter().find(|r| r.sp_id == "c").unwrap();
        assert!((c.area() - 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_area_tie_breaks_on_sp_id() {
        let rows = vec![row("bbb", square(0.0, 0.0, 10.0)), row("aaa", square(5.0, 0.0, 10.0))];
        let out = OverlapResolver::new().resolve(rows);
        let a = out.iter().find(|r| r.sp_id == "aaa").unwrap();
        let b = out.iter().find(|r| r.sp_id == "bbb").unwrap();
        assert!((a.area() - 100.0).abs() < 1e-6);
        assert!((b.area() - 50.0).abs() < 1e-6);

        // Input order does not matter.
        let swapped = OverlapResolver::new().resolve(vec![
            row("aaa", square(5.0, 0.0, 10.0)),
            row("bbb", square(0.0, 0.0, 10.0)),
        ]);
        let b2 = swapped.iter().find(|r| r.sp_id == "bbb").unwrap();
        assert!((b2.area() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_fully_covered_row_is_dropped() {
        let rows = vec![row("x", square(0.0, 0.0, 10.0)), row("y", square(0.0, 0.0, 10.0))];
        let out = OverlapResolver::new().resolve(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sp_id, "x");
    }

    #[test]
    fn test_touching_rows_are_untouched() {
        let rows = vec![row("l", square(0.0, 0.0, 10.0)), row("r", square(10.0, 0.0, 5.0))];
        let out = OverlapResolver::new().resolve(rows.clone());
        assert_eq!(out, rows);
    }
}
