//! Transverse Mercator on the WGS84 ellipsoid (UTM zones).
//!
//! Series expansions from Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), pp. 61-64. Accuracy is well below a centimeter within a
//! zone, far finer than the bounds precision the pipeline reports.

/// WGS84 semi-major axis (meters)
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central meridian scale factor
const UTM_K0: f64 = 0.9996;
/// UTM false easting (meters)
const FALSE_EASTING: f64 = 500_000.0;
/// UTM false northing for southern zones (meters)
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone.
#[derive(Debug, Clone, Copy)]
pub struct TransverseMercator {
    /// Central meridian in degrees
    pub lon0: f64,
    /// Whether the zone uses the southern-hemisphere false northing
    pub south: bool,
    e2: f64,
    ep2: f64,
}

impl TransverseMercator {
    /// Projection for UTM `zone` (1..=60).
    pub fn utm(zone: u8, north: bool) -> Self {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        Self {
            lon0: (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0,
            south: !north,
            e2,
            ep2: e2 / (1.0 - e2),
        }
    }

    /// Meridian arc length from the equator to latitude `phi` (radians).
    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    /// Convert (lon, lat) degrees to (easting, northing) meters.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let phi = lat_deg.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = WGS84_A / (1.0 - self.e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = self.ep2 * cos_phi * cos_phi;
        let a = cos_phi * (lon_deg - self.lon0).to_radians();
        let m = self.meridian_arc(phi);

        let easting = UTM_K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING;

        let mut northing = UTM_K0
            * (m + n
                * tan_phi
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a.powi(6)
                        / 720.0));
        if self.south {
            northing += FALSE_NORTHING_SOUTH;
        }

        (easting, northing)
    }

    /// Convert (easting, northing) meters to (lon, lat) degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let e2 = self.e2;
        let x = easting - FALSE_EASTING;
        let y = if self.south {
            northing - FALSE_NORTHING_SOUTH
        } else {
            northing
        };

        let m = y / UTM_K0;
        let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));

        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = phi1.tan();
        let c1 = self.ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
        let n1 = WGS84_A / denom.sqrt();
        let r1 = WGS84_A * (1.0 - e2) / denom.powf(1.5);
        let d = x / (n1 * UTM_K0);

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d.powi(4)
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);

        let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_phi1;

        (self.lon0 + lon.to_degrees(), lat.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_meridian_on_equator() {
        let proj = TransverseMercator::utm(33, true);
        let (lon, lat) = proj.inverse(500_000.0, 0.0);
        assert!((lon - 15.0).abs() < 1e-9, "lon = {}", lon);
        assert!(lat.abs() < 1e-9, "lat = {}", lat);
    }

    #[test]
    fn test_southern_false_northing() {
        let proj = TransverseMercator::utm(23, false);
        let (lon, lat) = proj.inverse(500_000.0, 10_000_000.0);
        assert!((lon + 45.0).abs() < 1e-9);
        assert!(lat.abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip_within_zone() {
        for &(zone, north, lon, lat) in &[
            (32u8, true, 9.19, 45.46),
            (18, true, -74.006, 40.7128),
            (56, false, 151.2093, -33.8688),
        ] {
            let proj = TransverseMercator::utm(zone, north);
            let (e, n) = proj.forward(lon, lat);
            let (lon2, lat2) = proj.inverse(e, n);
            assert!((lon - lon2).abs() < 1e-6, "zone {} lon {} vs {}", zone, lon, lon2);
            assert!((lat - lat2).abs() < 1e-6, "zone {} lat {} vs {}", zone, lat, lat2);
        }
    }

    #[test]
    fn test_known_point() {
        // Milan cathedral, UTM 32N: approx E 514 980, N 5 034 540
        let (e, n) = TransverseMercator::utm(32, true).forward(9.1916, 45.4642);
        assert!((e - 514_980.0).abs() < 200.0, "easting {}", e);
        assert!((n - 5_034_540.0).abs() < 200.0, "northing {}", n);
    }
}
