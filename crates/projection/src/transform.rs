//! Reprojection of points and bounding boxes to EPSG:4326.

use mosaic_common::{BoundingBox, CrsCode, MosaicError, MosaicResult};

use crate::{TransverseMercator, WebMercator};

/// Points sampled along each edge when reprojecting a bounding box.
///
/// Projected edges are curves in geographic space, so corners alone can
/// underestimate the extent.
pub const DEFAULT_DENSIFY_POINTS: usize = 21;

/// Convert a point from `crs` to (lon, lat) degrees.
pub fn to_geographic(crs: CrsCode, x: f64, y: f64) -> (f64, f64) {
    match crs {
        CrsCode::Epsg4326 => (x, y),
        CrsCode::Epsg3857 => WebMercator.inverse(x, y),
        CrsCode::Utm { zone, north } => TransverseMercator::utm(zone, north).inverse(x, y),
    }
}

/// Convert (lon, lat) degrees to a point in `crs`.
pub fn from_geographic(crs: CrsCode, lon: f64, lat: f64) -> (f64, f64) {
    match crs {
        CrsCode::Epsg4326 => (lon, lat),
        CrsCode::Epsg3857 => WebMercator.forward(lon, lat),
        CrsCode::Utm { zone, north } => TransverseMercator::utm(zone, north).forward(lon, lat),
    }
}

/// Convert a point between two CRSs through geographic coordinates.
pub fn reproject_point(from: CrsCode, to: CrsCode, x: f64, y: f64) -> (f64, f64) {
    if from == to {
        return (x, y);
    }
    let (lon, lat) = to_geographic(from, x, y);
    from_geographic(to, lon, lat)
}

/// Reproject a bounding box to EPSG:4326, sampling `densify` points per edge.
pub fn transform_bounds(bbox: &BoundingBox, crs: CrsCode, densify: usize) -> MosaicResult<BoundingBox> {
    if crs.is_geographic() {
        return Ok(*bbox);
    }

    let steps = densify.max(2);
    let mut samples = Vec::with_capacity(steps * 4);
    for i in 0..steps {
        let t = i as f64 / (steps - 1) as f64;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        samples.push((x, bbox.min_y));
        samples.push((x, bbox.max_y));
        samples.push((bbox.min_x, y));
        samples.push((bbox.max_x, y));
    }

    let geographic = BoundingBox::from_points(
        samples
            .into_iter()
            .map(|(x, y)| to_geographic(crs, x, y))
            .filter(|(lon, lat)| lon.is_finite() && lat.is_finite()),
    )
    .ok_or_else(|| {
        MosaicError::InternalError(format!("bounds {:?} in {} did not reproject", bbox, crs))
    })?;

    tracing::debug!(
        crs = %crs,
        min_lon = geographic.min_x,
        min_lat = geographic.min_y,
        max_lon = geographic.max_x,
        max_lat = geographic.max_y,
        "Reprojected bounds"
    );

    Ok(geographic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproject_point_roundtrip() {
        let utm = CrsCode::Utm { zone: 32, north: true };
        let (x, y) = reproject_point(CrsCode::Epsg4326, utm, 9.19, 45.46);
        let (lon, lat) = reproject_point(utm, CrsCode::Epsg4326, x, y);
        assert!((lon - 9.19).abs() < 1e-6);
        assert!((lat - 45.46).abs() < 1e-6);
        assert_eq!(reproject_point(utm, utm, 1.0, 2.0), (1.0, 2.0));
    }

    #[test]
    fn test_geographic_passthrough() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(
            transform_bounds(&bbox, CrsCode::Epsg4326, DEFAULT_DENSIFY_POINTS).unwrap(),
            bbox
        );
    }

    #[test]
    fn test_web_mercator_bounds() {
        let (x0, y0) = WebMercator.forward(10.0, 40.0);
        let (x1, y1) = WebMercator.forward(11.0, 41.0);
        let bbox = BoundingBox::new(x0, y0, x1, y1);
        let geo = transform_bounds(&bbox, CrsCode::Epsg3857, DEFAULT_DENSIFY_POINTS).unwrap();
        assert!((geo.min_x - 10.0).abs() < 1e-9);
        assert!((geo.min_y - 40.0).abs() < 1e-9);
        assert!((geo.max_x - 11.0).abs() < 1e-9);
        assert!((geo.max_y - 41.0).abs() < 1e-9);
    }

    #[test]
    fn test_utm_bounds_contain_corners() {
        let crs = CrsCode::Utm { zone: 33, north: true };
        let bbox = BoundingBox::new(400_000.0, 5_000_000.0, 509_760.0, 5_109_760.0);
        let geo = transform_bounds(&bbox, crs, DEFAULT_DENSIFY_POINTS).unwrap();
        for (x, y) in [
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.min_x, bbox.max_y),
            (bbox.max_x, bbox.max_y),
        ] {
            let (lon, lat) = to_geographic(crs, x, y);
            assert!(geo.contains_point(lon, lat));
        }
        // Tile sits west of the 15E central meridian, around 45N.
        assert!(geo.min_x > 13.0 && geo.max_x < 15.2);
        assert!(geo.min_y > 45.0 && geo.max_y < 46.2);
    }
}
