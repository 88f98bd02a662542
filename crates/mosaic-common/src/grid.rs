//! Affine pixel grids for north-up rasters.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// North-up affine mapping between pixel space and a CRS.
///
/// Pixel `(col, row)` refers to the top-left corner of that pixel, so
/// `(0, 0)` maps to `(origin_x, origin_y)` and `(width, height)` maps to the
/// bottom-right corner of the raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the top-left corner
    pub origin_x: f64,
    /// Y coordinate of the top-left corner
    pub origin_y: f64,
    /// Pixel size along X (always positive)
    pub pixel_width: f64,
    /// Pixel size along Y (always positive, rows grow southwards)
    pub pixel_height: f64,
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl GeoTransform {
    /// Derive the transform covering `bbox` with a `width` x `height` grid.
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            origin_x: bbox.min_x,
            origin_y: bbox.max_y,
            pixel_width: bbox.width().abs() / width.max(1) as f64,
            pixel_height: bbox.height().abs() / height.max(1) as f64,
            width,
            height,
        }
    }

    /// Map a (fractional) pixel position to CRS coordinates.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y - row * self.pixel_height,
        )
    }

    /// CRS coordinates of the center of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map CRS coordinates to a fractional pixel position.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Index of the pixel containing `(x, y)`, if inside the grid.
    pub fn coord_to_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }

        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((col, row))
    }

    /// Bounding box covered by the grid.
    pub fn bounds(&self) -> BoundingBox {
        let (max_x, min_y) = self.pixel_to_geo(self.width as f64, self.height as f64);
        BoundingBox::new(self.origin_x, min_y, max_x, self.origin_y)
    }

    /// True if both transforms describe the same grid within a tolerance
    /// of a hundredth of a pixel.
    pub fn same_grid(&self, other: &GeoTransform) -> bool {
        let tol_x = self.pixel_width * 0.01;
        let tol_y = self.pixel_height * 0.01;
        self.width == other.width
            && self.height == other.height
            && (self.origin_x - other.origin_x).abs() <= tol_x
            && (self.origin_y - other.origin_y).abs() <= tol_y
            && (self.pixel_width - other.pixel_width).abs() <= tol_x
            && (self.pixel_height - other.pixel_height).abs() <= tol_y
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
