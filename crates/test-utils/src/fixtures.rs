//! Common fixtures: regions, scenes and request pieces.

use chrono::{TimeZone, Utc};
use mosaic_common::{BoundingBox, Region, SceneDescriptor};

/// Common bounding boxes, as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    /// The unit square used by generated fragments.
    pub const UNIT: (f64, f64, f64, f64) = (0.0, 0.0, 1.0, 1.0);

    /// A field-sized area near Lleida, Spain (~330 ha).
    pub const FIELD: (f64, f64, f64, f64) = (0.60, 41.60, 0.62, 41.615);

    /// Alpine area around Mont Blanc (~110 000 ha).
    pub const ALPS: (f64, f64, f64, f64) = (6.6, 45.7, 7.1, 46.0);
}

/// Region covering a bounding box tuple.
pub fn region_from_tuple((min_x, min_y, max_x, max_y): (f64, f64, f64, f64)) -> Region {
    Region::from_bbox(&BoundingBox::new(min_x, min_y, max_x, max_y))
        .expect("fixture bounding box is a valid polygon")
}

/// Region covering the unit square.
pub fn unit_region() -> Region {
    region_from_tuple(bbox::UNIT)
}

/// GeoJSON polygon for the unit square, as a request would carry it.
pub fn unit_polygon_json() -> serde_json::Value {
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
    })
}

/// A scene with red/green/blue/nir assets captured on `day` of January 2024.
pub fn scene(id: &str, day: u32, cloud_cover: f64) -> SceneDescriptor {
    let mut scene = SceneDescriptor::new(id);
    scene.datetime = Utc.with_ymd_and_hms(2024, 1, day, 10, 30, 0).single();
    scene.cloud_cover = Some(cloud_cover);
    scene.platform = Some("sentinel-2a".to_string());
    scene.collection = Some("sentinel-2-l2a".to_string());
    scene.bbox = Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    for band in ["red", "green", "blue", "nir"] {
        scene
            .assets
            .insert(band.to_string(), format!("s3://imagery/{}/{}.tif", id, band));
    }
    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_is_small() {
        let area = region_from_tuple(bbox::FIELD).area_hectares();
        assert!(area > 200.0 && area < 500.0, "area {}", area);
    }

    #[test]
    fn test_alps_exceed_default_limit() {
        assert!(region_from_tuple(bbox::ALPS).area_hectares() > 100_000.0);
    }

    #[test]
    fn test_scene_fixture() {
        let s = scene("S2A_1", 3, 4.5);
        assert!(s.has_assets(&["red".into(), "nir".into()]));
        assert!(s.datetime.is_some());
    }
}
