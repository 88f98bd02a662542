//! Synthetic rasters with predictable values.
//!
//! Fragments default to EPSG:4326 over the unit square so that pixel size is
//! `1 / width` degrees and expected coordinates are easy to work out.

use mosaic_common::{BoundingBox, CrsCode, RasterFragment};
use ndarray::{Array2, Array3};

/// Bounds shared by generated fragments: lon 0..1, lat 0..1.
pub fn unit_bounds() -> BoundingBox {
    BoundingBox::new(0.0, 0.0, 1.0, 1.0)
}

/// Band identifiers as owned strings.
pub fn band_names(bands: &[&str]) -> Vec<String> {
    bands.iter().map(|b| b.to_string()).collect()
}

/// Creates a fully valid fragment whose values come from `value(band, row, col)`.
///
/// # Example
///
/// ```
/// use test_utils::fragment_from_fn;
///
/// let f = fragment_from_fn("S1", &["red"], 4, 3, |_, row, col| (row * 10 + col) as f32);
/// assert_eq!(f.data[[0, 2, 3]], 23.0);
/// assert_eq!(f.valid_count(), 12);
/// ```
pub fn fragment_from_fn<F>(
    scene_id: &str,
    bands: &[&str],
    width: usize,
    height: usize,
    value: F,
) -> RasterFragment
where
    F: Fn(usize, usize, usize) -> f32,
{
    let data = Array3::from_shape_fn((bands.len(), height, width), |(b, r, c)| value(b, r, c));
    let mask = Array2::from_elem((height, width), true);
    RasterFragment::new(
        scene_id,
        band_names(bands),
        data,
        mask,
        unit_bounds(),
        CrsCode::Epsg4326,
    )
    .expect("generated fragment has consistent shapes")
}

/// Creates a fully valid fragment with every band set to `value`.
pub fn constant_fragment(
    scene_id: &str,
    bands: &[&str],
    width: usize,
    height: usize,
    value: f32,
) -> RasterFragment {
    fragment_from_fn(scene_id, bands, width, height, |_, _, _| value)
}

/// Replaces a fragment's mask: `valid(row, col)` decides each pixel.
pub fn with_mask<F>(mut fragment: RasterFragment, valid: F) -> RasterFragment
where
    F: Fn(usize, usize) -> bool,
{
    let (height, width) = fragment.mask.dim();
    fragment.mask = Array2::from_shape_fn((height, width), |(r, c)| valid(r, c));
    fragment
}

/// Moves a fragment onto other bounds (same pixel dimensions).
pub fn with_bounds(mut fragment: RasterFragment, bounds: BoundingBox) -> RasterFragment {
    fragment.bounds = bounds;
    fragment
}

/// Creates a cone-shaped elevation surface.
///
/// The summit (`peak`) sits at pixel `(row, col)` and the value drops by
/// `slope` per pixel of distance, never below zero.
pub fn cone_surface(
    width: usize,
    height: usize,
    summit: (usize, usize),
    peak: f32,
    slope: f32,
) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let dr = r as f32 - summit.0 as f32;
        let dc = c as f32 - summit.1 as f32;
        (peak - slope * (dr * dr + dc * dc).sqrt()).max(0.0)
    })
}

/// Wraps a single surface as a one-band `elevation` fragment.
pub fn elevation_fragment(scene_id: &str, surface: &Array2<f32>) -> RasterFragment {
    let (height, width) = surface.dim();
    fragment_from_fn(scene_id, &["elevation"], width, height, |_, r, c| surface[[r, c]])
}

/// Creates RGBA pixels with a smooth gradient (many distinct colors).
pub fn gradient_rgba_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = ((x + y) % 256) as u8;
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}

/// Creates RGBA pixels cycling through `classes` flat colors, with the
/// left-most column transparent.
pub fn classified_rgba_pixels(width: usize, height: usize, classes: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            if x == 0 {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let class = ((x / 4 + y / 4) % classes.max(1)) as u8;
            pixels.extend_from_slice(&[class.wrapping_mul(17), 128, 255 - class, 255]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_from_fn_layout() {
        let f = fragment_from_fn("S1", &["red", "nir"], 5, 2, |b, r, c| (b * 100 + r * 10 + c) as f32);
        assert_eq!(f.data.dim(), (2, 2, 5));
        assert_eq!(f.data[[1, 1, 4]], 114.0);
        assert_eq!(f.bands, vec!["red".to_string(), "nir".to_string()]);
    }

    #[test]
    fn test_with_mask() {
        let f = with_mask(constant_fragment("S1", &["red"], 4, 4, 1.0), |r, _| r < 2);
        assert_eq!(f.valid_count(), 8);
    }

    #[test]
    fn test_cone_surface() {
        let s = cone_surface(11, 11, (5, 5), 100.0, 10.0);
        assert_eq!(s[[5, 5]], 100.0);
        assert_eq!(s[[5, 6]], 90.0);
        assert!((s[[0, 0]] - 29.2893).abs() < 1e-3);
        assert_eq!(cone_surface(3, 3, (0, 0), 1.0, 5.0)[[2, 2]], 0.0);
    }

    #[test]
    fn test_classified_pixels_have_transparency() {
        let px = classified_rgba_pixels(8, 8, 5);
        assert_eq!(px.len(), 8 * 8 * 4);
        assert_eq!(px[3], 0);
        assert_eq!(px[7], 255);
    }
}
