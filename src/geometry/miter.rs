use geo_types::{Coord, LineString};

use super::ParcelGeometry;

/// Limit used when no vertex yields a usable angle.
pub const DEFAULT_MITER_LIMIT: f64 = 2.0;

/// Smallest miter limit that keeps every exterior corner sharp under a miter-join buffer.
///
/// For each vertex the angle θ between its two adjacent edges gives a miter
/// ratio of `1 / sin(θ/2)`; the limit is the maximum ratio over all exterior
/// vertices of all parts.
pub fn compute_miter_limit(geom: &ParcelGeometry) -> f64 {
    geom.polygons()
        .iter()
        .filter_map(|p| ring_max_ratio(p.exterior()))
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))))
        .unwrap_or(DEFAULT_MITER_LIMIT)
}

fn ring_max_ratio(ring: &LineString<f64>) -> Option<f64> {
    let mut coords: &[Coord<f64>] = &ring.0;
    if coords.len() > 1 && coords.first() == coords.last() {
        coords = &coords[..coords.len() - 1];
    }
    let n = coords.len();
    if n < 3 {
        return None;
    }

    let mut best: Option<f64> = None;
    for i in 0..n {
        let prev = coords[(i + n - 1) % n];
        let curr = coords[i];
        let next = coords[(i + 1) % n];

        let v1 = prev - curr;
        let v2 = next - curr;
        let norm_product = v1.x.hypot(v1.y) * v2.x.hypot(v2.y);
        if norm_product == 0.0 {
            continue;
        }

        let cos_theta = ((v1.x * v2.x + v1.y * v2.y) / norm_product).clamp(-1.0, 1.0);
        let theta = cos_theta.acos();
        if theta > 0.0 {
            let ratio = 1.0 / (theta / 2.0).sin();
            best = Some(best.map_or(ratio, |b: f64| b.max(ratio)));
        }
    }
    best
}
