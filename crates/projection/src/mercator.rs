//! Spherical (Web) Mercator, EPSG:3857.

use std::f64::consts::PI;

/// Sphere radius used by EPSG:3857 (the WGS84 semi-major axis).
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Web Mercator projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl WebMercator {
    /// Convert (lon, lat) in degrees to (x, y) meters.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = WEB_MERCATOR_RADIUS * lon_deg.to_radians();
        let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }

    /// Convert (x, y) meters to (lon, lat) in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_edges() {
        let (lon, lat) = WebMercator.inverse(20_037_508.342_789_244, 20_037_508.342_789_244);
        assert!((lon - 180.0).abs() < 1e-9);
        assert!((lat - MAX_LATITUDE).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip() {
        let (x, y) = WebMercator.forward(-74.006, 40.7128);
        let (lon, lat) = WebMercator.inverse(x, y);
        assert!((lon + 74.006).abs() < 1e-9);
        assert!((lat - 40.7128).abs() < 1e-9);
    }
}
