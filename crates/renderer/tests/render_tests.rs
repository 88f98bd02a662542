//! Tests for the render pipeline: ranges, treatments, alpha and formats.

use mosaic_common::MosaicError;
use ndarray::{Array2, Array3};
use renderer::{
    render, ColorFormula, ColorTreatment, Colormap, ImageFormat, RenderOptions, ValueRange,
};

fn greys() -> ColorTreatment {
    ColorTreatment::Colormap(Colormap::named("greys").unwrap())
}

fn decode(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

// ============================================================================
// Value ranges
// ============================================================================

#[test]
fn test_auto_range_ignores_sentinel_and_masked_pixels() {
    let data = Array3::from_shape_vec((1, 2, 3), vec![10.0, 20.0, -1.0, 30.0, -1.0, 500.0]).unwrap();
    let mask = Array2::from_shape_vec((2, 3), vec![true, true, true, true, true, false]).unwrap();
    let options = RenderOptions {
        nodata: -1.0,
        ..RenderOptions::default()
    };

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &greys(),
        true,
        ImageFormat::Png,
        &options,
    )
    .unwrap();

    assert_eq!(out.range, ValueRange::new(10.0, 30.0).unwrap());
}

#[test]
fn test_manual_range_is_reported_unchanged() {
    let data = Array3::from_elem((1, 2, 2), 7.0f32);
    let mask = Array2::from_elem((2, 2), true);
    let range = ValueRange::new(0.0, 100.0).unwrap();

    let out = render(
        data.view(),
        mask.view(),
        range,
        &greys(),
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap();
    assert_eq!(out.range, range);
}

#[test]
fn test_auto_range_without_valid_pixels_fails() {
    let data = Array3::from_elem((1, 2, 2), 5.0f32);
    let mask = Array2::from_elem((2, 2), false);
    let err = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &greys(),
        true,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, MosaicError::EmptyInput(_)));
}

// ============================================================================
// Pixels and alpha
// ============================================================================

#[test]
fn test_alpha_follows_mask() {
    let data = Array3::from_shape_fn((1, 3, 3), |(_, r, c)| (r * 3 + c) as f32 * 10.0);
    let mask = Array2::from_shape_fn((3, 3), |(r, c)| r != c);

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::new(0.0, 80.0).unwrap(),
        &greys(),
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap();

    assert_eq!((out.image.width, out.image.height), (3, 3));
    let img = decode(&out.image.bytes);
    for r in 0..3u32 {
        for c in 0..3u32 {
            let alpha = img.get_pixel(c, r)[3];
            assert_eq!(alpha, if r == c { 0 } else { 255 }, "pixel ({}, {})", r, c);
        }
    }
}

#[test]
fn test_fully_valid_colormap_render_has_alpha() {
    let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f32 * 250.0);
    let mask = Array2::from_elem((4, 4), true);
    let viridis = ColorTreatment::Colormap(Colormap::named("viridis").unwrap());

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &viridis,
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap();

    let img = image::load_from_memory(&out.image.bytes).unwrap();
    assert!(img.color().has_alpha());
    assert!(img.to_rgba8().pixels().all(|p| p[3] == 255));
}

#[test]
fn test_colormap_extremes() {
    let data = Array3::from_shape_vec((1, 1, 2), vec![0.0, 4000.0]).unwrap();
    let mask = Array2::from_elem((1, 2), true);

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &greys(),
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap();

    let img = decode(&out.image.bytes);
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255, 255]);
}

#[test]
fn test_empty_formula_is_linear_stretch() {
    let data = Array3::from_shape_vec((3, 1, 1), vec![0.0, 2000.0, 4000.0]).unwrap();
    let mask = Array2::from_elem((1, 1), true);
    let treatment = ColorTreatment::ColorFormula(ColorFormula::new(Vec::new()));

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &treatment,
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap();

    let px = decode(&out.image.bytes).get_pixel(0, 0).0;
    assert_eq!(px[0], 0);
    assert!((px[1] as i32 - 128).abs() <= 1);
    assert_eq!(px[2], 255);
    assert_eq!(px[3], 255);
}

#[test]
fn test_mask_shape_mismatch() {
    let data = Array3::from_elem((1, 2, 2), 1.0f32);
    let mask = Array2::from_elem((3, 2), true);
    let err = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &greys(),
        false,
        ImageFormat::Png,
        &RenderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, MosaicError::GridMismatch(_)));
}

// ============================================================================
// Formats
// ============================================================================

#[test]
fn test_jpeg_output() {
    let data = Array3::from_shape_fn((3, 16, 16), |(b, r, c)| (b * 1000 + r * 100 + c * 10) as f32);
    let mask = Array2::from_elem((16, 16), true);
    let treatment = ColorTreatment::ColorFormula(ColorFormula::default());

    let out = render(
        data.view(),
        mask.view(),
        ValueRange::default(),
        &treatment,
        false,
        ImageFormat::Jpeg,
        &RenderOptions::default(),
    )
    .unwrap();

    assert_eq!(&out.image.bytes[0..2], &[0xFF, 0xD8]);
    assert_eq!(out.image.format, ImageFormat::Jpeg);
    let img = decode(&out.image.bytes);
    assert_eq!(img.dimensions(), (16, 16));
}

#[test]
fn test_unsupported_format_rejected() {
    let err = ImageFormat::parse("BMP").unwrap_err();
    assert!(matches!(err, MosaicError::UnsupportedFormat(ref f) if f == "BMP"));
    assert_eq!(ImageFormat::parse("jpg").unwrap(), ImageFormat::Jpeg);
}

#[test]
fn test_format_serde() {
    let f: ImageFormat = serde_json::from_str(r#""png""#).unwrap();
    assert_eq!(f, ImageFormat::Png);
    assert!(serde_json::from_str::<ImageFormat>(r#""tiff""#).is_err());
}
