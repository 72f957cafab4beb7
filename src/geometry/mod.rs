pub mod miter;

use geo::{Area, BoundingRect, Centroid, Validation};
use geo_types::{Coord, Geometry, MultiPolygon, Polygon, Rect};

pub use miter::compute_miter_limit;

/// Areas at or below this are treated as empty output.
pub const AREA_EPSILON: f64 = 1e-9;

/// Polygonal geometry produced by the dissolve/buffer pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ParcelGeometry {
    Single(Polygon<f64>),
    Multi(MultiPolygon<f64>),
}

impl ParcelGeometry {
    /// Normalizes a boolean-op result: zero parts is `None`, one part is `Single`.
    /// Zero-area parts are discarded first.
    pub fn from_multi(mp: MultiPolygon<f64>) -> Option<Self> {
        let mut parts: Vec<Polygon<f64>> = mp
            .0
            .into_iter()
            .filter(|p| p.unsigned_area() > AREA_EPSILON)
            .collect();
        match parts.len() {
            0 => None,
            1 => parts.pop().map(ParcelGeometry::Single),
            _ => Some(ParcelGeometry::Multi(MultiPolygon::new(parts))),
        }
    }

    pub fn is_multi_part(&self) -> bool {
        matches!(self, ParcelGeometry::Multi(mp) if mp.0.len() > 1)
    }

    pub fn part_count(&self) -> usize {
        self.polygons().len()
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            ParcelGeometry::Single(p) => std::slice::from_ref(p),
            ParcelGeometry::Multi(mp) => &mp.0,
        }
    }

    /// Splits into single-polygon parts ordered by bounding-box minimum corner.
    pub fn explode(self) -> Vec<Polygon<f64>> {
        let mut parts = match self {
            ParcelGeometry::Single(p) => return vec![p],
            ParcelGeometry::Multi(mp) => mp.0,
        };
        parts.sort_by(|a, b| {
            let ka = min_corner(a);
            let kb = min_corner(b);
            ka.x.total_cmp(&kb.x).then(ka.y.total_cmp(&kb.y))
        });
        parts
    }

    pub fn to_multi(&self) -> MultiPolygon<f64> {
        match self {
            ParcelGeometry::Single(p) => MultiPolygon::new(vec![p.clone()]),
            ParcelGeometry::Multi(mp) => mp.clone(),
        }
    }

    pub fn unsigned_area(&self) -> f64 {
        match self {
            ParcelGeometry::Single(p) => p.unsigned_area(),
            ParcelGeometry::Multi(mp) => mp.unsigned_area(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons().iter().all(|p| p.exterior().0.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ParcelGeometry::Single(p) => p.is_valid(),
            ParcelGeometry::Multi(mp) => mp.is_valid(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            ParcelGeometry::Single(p) => p.bounding_rect(),
            ParcelGeometry::Multi(mp) => mp.bounding_rect(),
        }
    }

    pub fn centroid(&self) -> Option<Coord<f64>> {
        match self {
            ParcelGeometry::Single(p) => p.centroid().map(|pt| pt.0),
            ParcelGeometry::Multi(mp) => mp.centroid().map(|pt| pt.0),
        }
    }
}

impl From<Polygon<f64>> for ParcelGeometry {
    fn from(p: Polygon<f64>) -> Self {
        ParcelGeometry::Single(p)
    }
}

impl From<ParcelGeometry> for Geometry<f64> {
    fn from(g: ParcelGeometry) -> Self {
        match g {
            ParcelGeometry::Single(p) => Geometry::Polygon(p),
            ParcelGeometry::Multi(mp) => Geometry::MultiPolygon(mp),
        }
    }
}

fn min_corner(p: &Polygon<f64>) -> Coord<f64> {
    p.bounding_rect()
        .map(|r| r.min())
        .unwrap_or(Coord { x: f64::MAX, y: f64::MAX })
}
