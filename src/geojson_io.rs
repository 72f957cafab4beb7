//! GeoJSON adapter: parcel ingestion and super-parcel output.

use std::collections::HashSet;
use std::convert::TryFrom;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::{info, warn};

use crate::error::{Result, SuperParcelError};
use crate::parcel::{Parcel, ParcelId};
use crate::superparcel::SuperParcel;

/// Parses a GeoJSON document that must be a FeatureCollection.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = text.parse()?;
    Ok(FeatureCollection::try_from(geojson)?)
}

fn property_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_id(feature: &Feature, fallback: usize) -> ParcelId {
    let from_props = feature
        .properties
        .as_ref()
        .and_then(|p| p.get("id"))
        .and_then(JsonValue::as_u64);
    let from_feature = match &feature.id {
        Some(geojson::feature::Id::Number(n)) => n.as_u64(),
        _ => None,
    };
    from_feature.or(from_props).unwrap_or(fallback as ParcelId)
}

/// Reads parcels from a FeatureCollection.
///
/// Every feature must carry `owner_field` and `region_field`; a feature missing
/// either is a configuration error for the whole run. Features with a null
/// owner or region, or with a geometry that is not a single polygon, are
/// skipped with a warning. Ids come from the feature id or an `id` property,
/// else from feature order. Two kept parcels sharing an id is a configuration
/// error.
pub fn read_parcels(fc: &FeatureCollection, owner_field: &str, region_field: &str) -> Result<Vec<Parcel>> {
    let mut parcels = Vec::with_capacity(fc.features.len());
    let mut seen: HashSet<ParcelId> = HashSet::with_capacity(fc.features.len());
    for (index, feature) in fc.features.iter().enumerate() {
        let id = feature_id(feature, index);
        let props = feature.properties.as_ref();

        let field = |name: &str| -> Result<Option<String>> {
            let value = props.and_then(|p| p.get(name)).ok_or_else(|| {
                SuperParcelError::Config(format!("feature {} has no {:?} property", index, name))
            })?;
            Ok(property_as_string(value))
        };
        let (Some(owner), Some(region)) = (field(owner_field)?, field(region_field)?) else {
            warn!("Skipping parcel {}: null owner or region", id);
            continue;
        };

        let Some(geometry) = &feature.geometry else {
            warn!("Skipping parcel {}: no geometry", id);
            continue;
        };
        let polygon = match geo_types::Geometry::<f64>::try_from(geometry.value.clone())? {
            geo_types::Geometry::Polygon(p) => p,
            geo_types::Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => mp.0.remove(0),
            _ => {
                warn!("Skipping parcel {}: geometry is not a single polygon", id);
                continue;
            }
        };

        match Parcel::new(id, owner, region, polygon) {
            Ok(parcel) => {
                if !seen.insert(id) {
                    return Err(SuperParcelError::Config(format!(
                        "duplicate parcel id {} at feature {}",
                        id, index
                    )));
                }
                parcels.push(parcel);
            }
            Err(e) => warn!("Skipping {}", e),
        }
    }
    info!("Read {} parcels from {} features", parcels.len(), fc.features.len());
    Ok(parcels)
}

fn superparcel_properties(sp: &SuperParcel) -> JsonObject {
    let mut props = JsonObject::new();
    props.insert("sp_id".into(), sp.sp_id.clone().into());
    props.insert("cluster_id".into(), sp.cluster_id.clone().into());
    props.insert("owner".into(), sp.owner.clone().into());
    props.insert("region_code".into(), sp.region_code.clone().into());
    props.insert("member_count".into(), sp.member_count.into());
    props.insert("total_member_area".into(), sp.total_member_area.into());
    props.insert("merged_area".into(), sp.merged_area.into());
    props.insert("area_ratio".into(), sp.area_ratio.into());
    props.insert("cbi".into(), sp.cross_boundary_indicator().into());
    props.insert("buffer_distance".into(), sp.buffer_distance.into());
    props
}

pub fn write_superparcels(superparcels: &[SuperParcel]) -> FeatureCollection {
    let features = superparcels
        .iter()
        .map(|sp| {
            let geometry: geo_types::Geometry<f64> = sp.geometry.clone().into();
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&geometry))),
                id: None,
                properties: Some(superparcel_properties(sp)),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ParcelGeometry;
    use geo_types::{LineString, Polygon};

    const PARCELS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"OWNER": "A", "FIPS": "06001"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"type": "Feature", "id": 77, "properties": {"OWNER": "B", "FIPS": 6001},
             "geometry": {"type": "Polygon", "coordinates": [[[20,0],[30,0],[30,10],[20,10],[20,0]]]}},
            {"type": "Feature", "properties": {"OWNER": null, "FIPS": "06001"},
             "geometry": {"type": "Polygon", "coordinates": [[[40,0],[50,0],[50,10],[40,10],[40,0]]]}},
            {"type": "Feature", "properties": {"OWNER": "C", "FIPS": "06001"},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}}
        ]
    }"#;

    #[test]
    fn test_read_parcels_assigns_ids_and_skips_unusable_rows() {
        let fc = parse_feature_collection(PARCELS).unwrap();
        let parcels = read_parcels(&fc, "OWNER", "FIPS").unwrap();
        assert_eq!(parcels.len(), 2);
        assert_eq!(parcels[0].id(), 0);
        assert_eq!(parcels[0].owner(), "A");
        assert_eq!(parcels[1].id(), 77);
        assert_eq!(parcels[1].region_code(), "6001");
    }

    #[test]
    fn test_missing_owner_field_is_config_error() {
        let fc = parse_feature_collection(PARCELS).unwrap();
        let err = read_parcels(&fc, "OWNER_NAME", "FIPS").unwrap_err();
        assert!(matches!(err, SuperParcelError::Config(_)));
    }

    #[test]
    fn test_explicit_id_colliding_with_feature_order_is_rejected() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "id": 1,
                  "properties": { "OWNER": "A", "FIPS": "1" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] } },
                { "type": "Feature",
                  "properties": { "OWNER": "A", "FIPS": "1" },
                  "geometry": { "type": "Polygon", "coordinates": [[[2,0],[3,0],[3,1],[2,1],[2,0]]] } }
            ]
        }"#;
        let fc = parse_feature_collection(text).unwrap();
        match read_parcels(&fc, "OWNER", "FIPS").unwrap_err() {
            SuperParcelError::Config(msg) => assert!(msg.contains("duplicate parcel id 1"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_write_superparcels_properties() {
        let sp = SuperParcel {
            sp_id: "abc".into(),
            cluster_id: "A_1-0-0".into(),
            owner: "A".into(),
            region_code: "1".into(),
            geometry: ParcelGeometry::Single(Polygon::new(
                LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
                vec![],
            )),
            member_ids: vec![1, 2, 3],
            member_count: 3,
            total_member_area: 0.4,
            merged_area: 0.5,
            area_ratio: 0.8,
            cross_boundary: true,
            buffer_distance: 2.0,
        };
        let fc = write_superparcels(&[sp]);
        assert_eq!(fc.features.len(), 1);
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["sp_id"], "abc");
        assert_eq!(props["cbi"], 1);
        assert_eq!(props["member_count"], 3);
        assert!(matches!(
            fc.features[0].geometry.as_ref().unwrap().value,
            Value::Polygon(_)
        ));
    }
}
