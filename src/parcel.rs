use geo::{Area, BoundingRect, Centroid, Validation};
use geo_types::{Coord, Polygon};

use crate::error::{Result, SuperParcelError};

pub type ParcelId = u64;

/// A candidate parcel. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    id: ParcelId,
    owner: String,
    region_code: String,
    geometry: Polygon<f64>,
}

impl Parcel {
    /// Builds a parcel, rejecting empty owners/regions and empty, zero-area or
    /// invalid (self-intersecting) geometry.
    pub fn new(
        id: ParcelId,
        owner: impl Into<String>,
        region_code: impl Into<String>,
        geometry: Polygon<f64>,
    ) -> Result<Self> {
        let owner = owner.into();
        let region_code = region_code.into();

        if owner.trim().is_empty() {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "owner is empty".into(),
            });
        }
        if region_code.trim().is_empty() {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "region code is empty".into(),
            });
        }
        if geometry.exterior().0.len() < 4 {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "polygon exterior has fewer than 4 coordinates".into(),
            });
        }
        let all_finite = geometry
            .exterior()
            .coords()
            .chain(geometry.interiors().iter().flat_map(|r| r.coords()))
            .all(|c| c.x.is_finite() && c.y.is_finite());
        if !all_finite {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "polygon has non-finite coordinates".into(),
            });
        }
        if geometry.unsigned_area() <= 0.0 {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "polygon has zero area".into(),
            });
        }
        if !geometry.is_valid() {
            return Err(SuperParcelError::InvalidParcel {
                id,
                reason: "polygon is not valid (self-intersecting or malformed ring)".into(),
            });
        }

        Ok(Self {
            id,
            owner,
            region_code,
            geometry,
        })
    }

    pub fn id(&self) -> ParcelId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    pub fn geometry(&self) -> &Polygon<f64> {
        &self.geometry
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Area-weighted centroid, falling back to the bounding box center.
    pub fn centroid(&self) -> Coord<f64> {
        match self.geometry.centroid() {
            Some(pt) => pt.0,
            None => self
                .geometry
                .bounding_rect()
                .map(|r| r.center())
                .unwrap_or_else(|| self.geometry.exterior().0[0]),
        }
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

    #[test]
    fn test_valid_parcel() {
        let p = Parcel::new(7, "SMITH", "06001", square(0.0, 0.0, 10.0)).unwrap();
        assert_eq!(p.id(), 7);
        assert_eq!(p.owner(), "SMITH");
        assert_eq!(p.region_code(), "06001");
        assert!((p.area() - 100.0).abs() < 1e-9);
        let c = p.centroid();
        assert!((c.x - 5.0).abs() < 1e-9 && (c.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_missing_owner_and_region() {
        assert!(Parcel::new(1, " ", "06001", square(0.0, 0.0, 1.0)).is_err());
        assert!(Parcel::new(1, "A", "", square(0.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        assert!(Parcel::new(1, "A", "R", empty).is_err());

        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let err = Parcel::new(2, "A", "R", flat).unwrap_err();
        assert!(matches!(err, SuperParcelError::InvalidParcel { id: 2, .. }));
    }

    #[test]
    fn test_rejects_self_intersecting_ring() {
        // Bowtie: nonzero shoelace area but the ring crosses itself
        let bowtie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(bowtie.unsigned_area() > 0.0);
        let err = Parcel::new(3, "A", "R", bowtie).unwrap_err();
        match err {
            SuperParcelError::InvalidParcel { id, reason } => {
                assert_eq!(id, 3);
                assert!(reason.contains("not valid"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
