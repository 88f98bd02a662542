//! Region polygons: containment, area and line clipping.
//!
//! Regions are small (a few dozen vertices) and clipped geometry is at most a
//! few thousand segments per contour level, so the clipping here uses plain
//! segment/edge intersection without spatial indexing.

use crate::geojson::{Feature, Geometry};
use crate::{BoundingBox, MosaicError, MosaicResult};
use serde_json::Value;

/// WGS84 equatorial radius in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Square meters per hectare.
const M2_PER_HECTARE: f64 = 10_000.0;

/// A requested area of interest in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Polygons, each a list of closed rings (exterior first, then holes).
    polygons: Vec<Vec<Vec<[f64; 2]>>>,
    /// The geometry as supplied by the caller.
    geometry: Geometry,
}

impl Region {
    /// Build a region from a Polygon or MultiPolygon geometry.
    pub fn from_geometry(geometry: Geometry) -> MosaicResult<Self> {
        let polygons = match &geometry {
            Geometry::Polygon { coordinates } => vec![coordinates.clone()],
            Geometry::MultiPolygon { coordinates } => coordinates.clone(),
            other => {
                return Err(MosaicError::InvalidGeometry(format!(
                    "region must be a Polygon or MultiPolygon, got {}",
                    other.type_name()
                )))
            }
        };

        let mut closed = Vec::with_capacity(polygons.len());
        for rings in polygons {
            if rings.is_empty() {
                return Err(MosaicError::InvalidGeometry("polygon without rings".into()));
            }
            let mut fixed = Vec::with_capacity(rings.len());
            for mut ring in rings {
                if ring.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(MosaicError::InvalidGeometry("non-finite coordinate".into()));
                }
                if ring.first() != ring.last() {
                    if let Some(&first) = ring.first() {
                        ring.push(first);
                    }
                }
                if ring.len() < 4 {
                    return Err(MosaicError::InvalidGeometry(format!(
                        "ring needs at least 3 distinct vertices, got {}",
                        ring.len().saturating_sub(1)
                    )));
                }
                fixed.push(ring);
            }
            closed.push(fixed);
        }

        if closed.is_empty() {
            return Err(MosaicError::InvalidGeometry("empty MultiPolygon".into()));
        }

        Ok(Self {
            polygons: closed,
            geometry,
        })
    }

    /// Build a region from raw GeoJSON: a geometry, a Feature, or a
    /// FeatureCollection whose first feature carries the polygon.
    pub fn from_geojson(value: &Value) -> MosaicResult<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("Feature") => {
                let feature: Feature = serde_json::from_value(value.clone())?;
                let geometry = feature
                    .geometry
                    .ok_or_else(|| MosaicError::InvalidGeometry("feature without geometry".into()))?;
                Self::from_geometry(geometry)
            }
            Some("FeatureCollection") => {
                let first = value
                    .get("features")
                    .and_then(Value::as_array)
                    .and_then(|f| f.first())
                    .ok_or_else(|| MosaicError::InvalidGeometry("empty FeatureCollection".into()))?;
                Self::from_geojson(first)
            }
            Some(_) => Self::from_geometry(serde_json::from_value(value.clone())?),
            None => Err(MosaicError::InvalidGeometry("missing GeoJSON type".into())),
        }
    }

    /// Axis-aligned rectangular region.
    pub fn from_bbox(bbox: &BoundingBox) -> MosaicResult<Self> {
        Self::from_geometry(Geometry::from_bbox(bbox))
    }

    /// The geometry as supplied.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Bounding box of all exterior rings.
    pub fn bbox(&self) -> BoundingBox {
        let points = self
            .polygons
            .iter()
            .filter_map(|rings| rings.first())
            .flatten()
            .map(|p| (p[0], p[1]));
        // Construction guarantees at least one ring with four points.
        BoundingBox::from_points(points).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Point-in-region test (even-odd rule per polygon, holes excluded).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|rings| {
            let mut rings = rings.iter();
            match rings.next() {
                Some(exterior) if ring_contains(exterior, x, y) => {
                    !rings.any(|hole| ring_contains(hole, x, y))
                }
                _ => false,
            }
        })
    }

    /// Approximate geodesic area in hectares.
    pub fn area_hectares(&self) -> f64 {
        let m2: f64 = self
            .polygons
            .iter()
            .map(|rings| {
                let mut rings = rings.iter();
                let exterior = rings.next().map(|r| ring_area_m2(r)).unwrap_or(0.0);
                let holes: f64 = rings.map(|r| ring_area_m2(r)).sum();
                (exterior - holes).max(0.0)
            })
            .sum();
        m2 / M2_PER_HECTARE
    }

    /// Planar area in hectares after projecting each vertex with `project`.
    ///
    /// `project` maps longitude/latitude degrees to metres.
    pub fn projected_area_hectares<F>(&self, project: F) -> f64
    where
        F: Fn(f64, f64) -> (f64, f64),
    {
        let planar = |ring: &Vec<[f64; 2]>| -> f64 {
            let projected: Vec<(f64, f64)> = ring.iter().map(|p| project(p[0], p[1])).collect();
            let twice: f64 = projected
                .windows(2)
                .map(|edge| edge[0].0 * edge[1].1 - edge[1].0 * edge[0].1)
                .sum();
            (twice / 2.0).abs()
        };
        let m2: f64 = self
            .polygons
            .iter()
            .map(|rings| {
                let mut rings = rings.iter();
                let exterior = rings.next().map(|r| planar(r)).unwrap_or(0.0);
                let holes: f64 = rings.map(|r| planar(r)).sum();
                (exterior - holes).max(0.0)
            })
            .sum();
        m2 / M2_PER_HECTARE
    }

    /// Clip a polyline to the region.
    ///
    /// Returns the pieces of the line lying inside the region, in order.
    /// An empty result means the line lies entirely outside.
    pub fn clip_line(&self, line: &[[f64; 2]]) -> Vec<Vec<[f64; 2]>> {
        let mut parts: Vec<Vec<[f64; 2]>> = Vec::new();
        let mut current: Vec<[f64; 2]> = Vec::new();

        for window in line.windows(2) {
            let (p, q) = (window[0], window[1]);

            let mut cuts = vec![0.0, 1.0];
            for rings in &self.polygons {
                for ring in rings {
                    for edge in ring.windows(2) {
                        if let Some(t) = segment_intersection(p, q, edge[0], edge[1]) {
                            cuts.push(t);
                        }
                    }
                }
            }
            cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

            for span in cuts.windows(2) {
                let (t0, t1) = (span[0], span[1]);
                let mid = lerp(p, q, (t0 + t1) / 2.0);
                if self.contains(mid[0], mid[1]) {
                    let start = lerp(p, q, t0);
                    if current.last() != Some(&start) {
                        if !current.is_empty() {
                            parts.push(std::mem::take(&mut current));
                        }
                        current.push(start);
                    }
                    current.push(lerp(p, q, t1));
                } else if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
        }

        if !current.is_empty() {
            parts.push(current);
        }
        parts.retain(|part| part.len() >= 2);
        parts
    }
}

fn lerp(p: [f64; 2], q: [f64; 2], t: f64) -> [f64; 2] {
    if t <= 0.0 {
        return p;
    }
    if t >= 1.0 {
        return q;
    }
    [p[0] + t * (q[0] - p[0]), p[1] + t * (q[1] - p[1])]
}

/// Parameter along `p -> q` where it crosses edge `a -> b`, if it does.
fn segment_intersection(p: [f64; 2], q: [f64; 2], a: [f64; 2], b: [f64; 2]) -> Option<f64> {
    let r = [q[0] - p[0], q[1] - p[1]];
    let s = [b[0] - a[0], b[1] - a[1]];
    let denom = r[0] * s[1] - r[1] * s[0];
    if denom.abs() < 1e-15 {
        return None;
    }
    let ap = [a[0] - p[0], a[1] - p[1]];
    let t = (ap[0] * s[1] - ap[1] * s[0]) / denom;
    let u = (ap[0] * r[1] - ap[1] * r[0]) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Even-odd ray casting against one closed ring.
fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let mut inside = false;
    for edge in ring.windows(2) {
        let (a, b) = (edge[0], edge[1]);
        if (a[1] > y) != (b[1] > y) {
            let x_cross = a[0] + (y - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
            if x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// Spherical ring area (Chamberlain & Duquette).
fn ring_area_m2(ring: &[[f64; 2]]) -> f64 {
    let sum: f64 = ring
        .windows(2)
        .map(|edge| {
            let (a, b) = (edge[0], edge[1]);
            (b[0] - a[0]).to_radians()
                * (2.0 + a[1].to_radians().sin() + b[1].to_radians().sin())
        })
        .sum();
    (sum * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Region {
        Region::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_rejects_non_polygon() {
        let err = Region::from_geometry(Geometry::point(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidGeometry(_)));
    }

    #[test]
    fn test_closes_open_ring() {
        let region = Region::from_geometry(Geometry::Polygon {
            coordinates: vec![vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]],
        })
        .unwrap();
        assert!(region.contains(1.0, 1.0));
        assert_eq!(region.bbox(), BoundingBox::new(0.0, 0.0, 2.0, 2.0));
    }

    #[test]
    fn test_contains_with_hole() {
        let region = Region::from_geometry(Geometry::Polygon {
            coordinates: vec![
                vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]],
            ],
        })
        .unwrap();
        assert!(region.contains(1.0, 1.0));
        assert!(!region.contains(5.0, 5.0));
        assert!(!region.contains(11.0, 5.0));
    }

    #[test]
    fn test_area_of_one_degree_at_equator() {
        // One degree square at the equator is roughly 111.3 km x 110.6 km.
        let area = unit_square().area_hectares();
        assert!(area > 1.20e6 && area < 1.26e6, "area = {}", area);
    }

    #[test]
    fn test_projected_area_with_hole() {
        let region = Region::from_geometry(Geometry::Polygon {
            coordinates: vec![
                vec![[0.0, 0.0], [300.0, 0.0], [300.0, 200.0], [0.0, 200.0], [0.0, 0.0]],
                vec![[100.0, 50.0], [200.0, 50.0], [200.0, 150.0], [100.0, 150.0], [100.0, 50.0]],
            ],
        })
        .unwrap();
        let area = region.projected_area_hectares(|x, y| (x, y));
        assert!((area - 5.0).abs() < 1e-9, "area = {}", area);
    }

    #[test]
    fn test_clip_line_crossing() {
        let parts = unit_square().clip_line(&[[-1.0, 0.5], [2.0, 0.5]]);
        assert_eq!(parts.len(), 1);
        let part = &parts[0];
        assert!((part[0][0] - 0.0).abs() < 1e-9);
        assert!((part.last().unwrap()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_line_outside() {
        assert!(unit_square().clip_line(&[[2.0, 2.0], [3.0, 3.0]]).is_empty());
    }

    #[test]
    fn test_clip_line_leaves_and_reenters() {
        let line = [[0.2, 0.5], [1.5, 0.5], [1.5, 0.8], [0.2, 0.8]];
        let parts = unit_square().clip_line(&line);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_from_geojson_feature() {
        let value = serde_json::json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
        });
        let region = Region::from_geojson(&value).unwrap();
        assert!(region.contains(0.5, 0.5));
    }
}
