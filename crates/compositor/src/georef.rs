//! Georeferencing of delivered images and world-file text.

use serde::{Deserialize, Serialize};

use mosaic_common::{BoundingBox, CrsCode, MosaicError, MosaicResult};
use projection::{transform_bounds, DEFAULT_DENSIFY_POINTS};

/// Decimal places kept in geographic bounds (about 0.1 m).
pub const BOUNDS_PRECISION: u32 = 6;

/// Placement of an image in EPSG:4326.
///
/// Corners are `[lat, lon]` pairs, the order web map widgets take. The
/// affine part follows world-file conventions: origin at the top-left
/// corner of the top-left pixel, pixel sizes positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub south_west: [f64; 2],
    pub north_east: [f64; 2],
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: u32,
    pub height: u32,
}

/// Georeference a `width` x `height` image covering `bounds` in `crs`.
pub fn georeference(
    bounds: &BoundingBox,
    crs: CrsCode,
    width: u32,
    height: u32,
) -> MosaicResult<GeoReference> {
    if width == 0 || height == 0 {
        return Err(MosaicError::invalid_parameter(
            "image",
            format!("cannot georeference a {}x{} image", width, height),
        ));
    }

    let geographic = transform_bounds(bounds, crs, DEFAULT_DENSIFY_POINTS)?.rounded(BOUNDS_PRECISION);
    let (west, south, east, north) = (
        geographic.min_x,
        geographic.min_y,
        geographic.max_x,
        geographic.max_y,
    );

    Ok(GeoReference {
        south_west: [south, west],
        north_east: [north, east],
        pixel_size_x: (east - west).abs() / width as f64,
        pixel_size_y: (north - south).abs() / height as f64,
        origin_x: west,
        origin_y: north,
        width,
        height,
    })
}

impl GeoReference {
    /// Six-line world file: x size, two rotation terms, negative y size,
    /// then the top-left corner.
    pub fn world_file(&self) -> String {
        format!(
            "{}\n0.0\n0.0\n{}\n{}\n{}\n",
            self.pixel_size_x, -self.pixel_size_y, self.origin_x, self.origin_y
        )
    }

    /// Rebuild a georeference from world-file text and the image size.
    pub fn from_world_file(text: &str, width: u32, height: u32) -> MosaicResult<Self> {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<f64>().map_err(|_| {
                    MosaicError::invalid_parameter("world_file", format!("'{}' is not a number", l))
                })
            })
            .collect::<MosaicResult<Vec<f64>>>()?;

        let [px, rot_y, rot_x, neg_py, origin_x, origin_y] = values[..] else {
            return Err(MosaicError::invalid_parameter(
                "world_file",
                format!("expected 6 lines, got {}", values.len()),
            ));
        };
        if rot_x != 0.0 || rot_y != 0.0 {
            return Err(MosaicError::invalid_parameter(
                "world_file",
                "rotated world files are not supported",
            ));
        }

        let (east, south) = (
            origin_x + px * width as f64,
            origin_y + neg_py * height as f64,
        );
        Ok(Self {
            south_west: [south, origin_x],
            north_east: [origin_y, east],
            pixel_size_x: px,
            pixel_size_y: -neg_py,
            origin_x,
            origin_y,
            width,
            height,
        })
    }

    /// Geographic position of a fractional pixel position.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_size_x,
            self.origin_y - row * self.pixel_size_y,
        )
    }

    /// Bounds reconstructed from the affine terms.
    pub fn bounds(&self) -> BoundingBox {
        let (east, south) = self.pixel_to_geo(self.width as f64, self.height as f64);
        BoundingBox::new(self.origin_x, south, east, self.origin_y)
    }
}
