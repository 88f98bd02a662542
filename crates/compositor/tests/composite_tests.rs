//! Tests for composite building, view evaluation and georeferencing.

use compositor::{
    build, evaluate, georeference, CompositeBuilder, GeoReference, NonFinitePolicy, ViewSpec,
};
use mosaic_common::{BoundingBox, CompositeRaster, CrsCode, MosaicError};
use test_utils::{
    assert_approx_eq, constant_fragment, fragment_from_fn, region_from_tuple, unit_region,
    with_bounds, with_mask,
};

// ============================================================================
// Composite building
// ============================================================================

#[test]
fn test_first_valid_fragment_wins() {
    let a = with_mask(constant_fragment("A", &["red"], 4, 4, 1.0), |_, c| c < 2);
    let b = constant_fragment("B", &["red"], 4, 4, 2.0);

    let composite = build(&[a, b], &unit_region()).unwrap();
    let red = composite.band("red").unwrap();

    for row in 0..4 {
        assert_eq!(red[[row, 0]], 1.0);
        assert_eq!(red[[row, 1]], 1.0);
        assert_eq!(red[[row, 2]], 2.0);
        assert_eq!(red[[row, 3]], 2.0);
    }
    assert_eq!(composite.valid_count(), 16);
    assert_eq!(composite.scene_ids(), ["A".to_string(), "B".to_string()]);
}

#[test]
fn test_merging_stops_once_every_pixel_is_valid() {
    let a = constant_fragment("A", &["red"], 4, 4, 1.0);
    let b = constant_fragment("B", &["red"], 4, 4, 2.0);

    let composite = build(&[a, b], &unit_region()).unwrap();
    assert_eq!(composite.scene_ids(), ["A".to_string()]);
    assert!(composite.band("red").unwrap().iter().all(|v| *v == 1.0));
}

#[test]
fn test_uncovered_pixels_stay_invalid() {
    let a = with_mask(constant_fragment("A", &["red"], 4, 4, 1.0), |r, _| r < 2);
    let b = with_mask(constant_fragment("B", &["red"], 4, 4, 2.0), |r, _| r < 1);

    let composite = CompositeBuilder::new()
        .with_nodata(-9999.0)
        .build(&[a, b], &unit_region())
        .unwrap();

    let red = composite.band("red").unwrap();
    for ((row, col), valid) in composite.mask().indexed_iter() {
        assert_eq!(*valid, row < 2, "pixel ({}, {})", row, col);
        if !valid {
            assert_eq!(red[[row, col]], -9999.0);
        }
    }
    assert_eq!(composite.nodata(), -9999.0);
}

#[test]
fn test_coarser_fragment_is_resampled_to_base_grid() {
    let base = with_mask(constant_fragment("A", &["red"], 4, 4, 0.0), |_, _| false);
    let coarse = fragment_from_fn("B", &["red"], 2, 2, |_, r, c| (r * 2 + c) as f32 + 1.0);

    let composite = build(&[base, coarse], &unit_region()).unwrap();
    let red = composite.band("red").unwrap();

    assert_eq!((composite.width(), composite.height()), (4, 4));
    assert_eq!(red[[0, 0]], 1.0);
    assert_eq!(red[[1, 1]], 1.0);
    assert_eq!(red[[0, 3]], 2.0);
    assert_eq!(red[[3, 0]], 3.0);
    assert_eq!(red[[3, 3]], 4.0);
    assert_eq!(composite.valid_count(), 16);
}

#[test]
fn test_band_order_follows_first_fragment() {
    let a = with_mask(
        fragment_from_fn("A", &["red", "nir"], 2, 2, |b, _, _| b as f32 + 10.0),
        |_, c| c == 0,
    );
    let b = fragment_from_fn("B", &["nir", "red"], 2, 2, |b, _, _| b as f32 + 20.0);

    let composite = build(&[a, b], &unit_region()).unwrap();
    assert_eq!(composite.bands(), ["red".to_string(), "nir".to_string()]);
    assert_eq!(composite.band("red").unwrap()[[0, 1]], 21.0);
    assert_eq!(composite.band("nir").unwrap()[[0, 1]], 20.0);
}

#[test]
fn test_fragment_outside_region_is_skipped() {
    let far = with_bounds(
        constant_fragment("FAR", &["red"], 4, 4, 9.0),
        BoundingBox::new(50.0, 50.0, 51.0, 51.0),
    );
    let near = constant_fragment("NEAR", &["red"], 4, 4, 1.0);

    let composite = build(&[far, near], &unit_region()).unwrap();
    assert_eq!(composite.scene_ids(), ["NEAR".to_string()]);
    assert_eq!(composite.bounds(), &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
}

#[test]
fn test_zero_fragments_is_empty_input() {
    let result = build(&[], &unit_region());
    assert!(matches!(result, Err(MosaicError::EmptyInput(_))));
}

#[test]
fn test_no_fragment_in_region_is_empty_input() {
    let fragment = constant_fragment("A", &["red"], 4, 4, 1.0);
    let region = region_from_tuple((20.0, 20.0, 21.0, 21.0));
    assert!(matches!(
        build(&[fragment], &region),
        Err(MosaicError::EmptyInput(_))
    ));
}

#[test]
fn test_fragment_missing_band_is_grid_mismatch() {
    let a = with_mask(constant_fragment("A", &["red", "nir"], 2, 2, 1.0), |_, _| false);
    let b = constant_fragment("B", &["red"], 2, 2, 1.0);
    assert!(matches!(
        build(&[a, b], &unit_region()),
        Err(MosaicError::GridMismatch(_))
    ));
}

// ============================================================================
// View evaluation
// ============================================================================

fn ratio_composite() -> CompositeRaster {
    // Pixel (0, 0) has a = b = 0; everywhere else a = 2, b = 1.
    let fragment = fragment_from_fn("A", &["a", "b"], 3, 3, |band, r, c| {
        if r == 0 && c == 0 {
            0.0
        } else if band == 0 {
            2.0
        } else {
            1.0
        }
    });
    build(&[fragment], &unit_region()).unwrap()
}

#[test]
fn test_zero_over_zero_becomes_zero_and_stays_valid() {
    let composite = ratio_composite();
    let view = evaluate(
        &composite,
        &ViewSpec::Expression("a / b".into()),
        NonFinitePolicy::ReplaceWithZero,
    )
    .unwrap();

    assert_eq!(view.channels(), 1);
    assert_eq!(view.data[[0, 0, 0]], 0.0);
    assert_eq!(view.data[[0, 1, 1]], 2.0);
    assert_eq!(view.mask, *composite.mask());
}

#[test]
fn test_mask_out_policy_invalidates_non_finite_pixels() {
    let composite = ratio_composite();
    let view = evaluate(
        &composite,
        &ViewSpec::Expression("a / b".into()),
        NonFinitePolicy::MaskOut,
    )
    .unwrap();

    assert!(!view.mask[[0, 0]]);
    assert_eq!(view.data[[0, 0, 0]], composite.nodata());
    assert_eq!(view.mask.iter().filter(|v| **v).count(), 8);
}

#[test]
fn test_asset_view_keeps_composite_mask() {
    let fragment = with_mask(
        fragment_from_fn("A", &["red", "green", "blue"], 2, 2, |b, _, _| b as f32),
        |r, c| r != c,
    );
    let composite = build(&[fragment], &unit_region()).unwrap();
    let view = evaluate(&composite, &ViewSpec::default(), NonFinitePolicy::default()).unwrap();

    assert_eq!(view.data.dim(), (3, 2, 2));
    assert_eq!(view.data[[2, 0, 1]], 2.0);
    assert!(!view.mask[[0, 0]]);
    assert!(view.mask[[0, 1]]);
}

#[test]
fn test_rgb_expression_channels() {
    let composite = ratio_composite();
    let view = evaluate(
        &composite,
        &ViewSpec::RgbExpression {
            bands: vec!["a".into(), "b".into()],
            formulas: ["a".into(), "b * 3".into(), "a / b".into()],
        },
        NonFinitePolicy::MaskOut,
    )
    .unwrap();

    assert_eq!(view.channels(), 3);
    assert_eq!(view.data[[1, 2, 2]], 3.0);
    assert!(!view.mask[[0, 0]]);
    assert!(view.mask[[1, 1]]);
}

#[test]
fn test_unknown_band_in_expression() {
    let composite = ratio_composite();
    let result = evaluate(
        &composite,
        &ViewSpec::Expression("(nir - a) / 2".into()),
        NonFinitePolicy::default(),
    );
    assert!(matches!(
        result,
        Err(MosaicError::UnknownBand { ref band, .. }) if band == "nir"
    ));
}

#[test]
fn test_two_band_asset_view_rejected() {
    let composite = ratio_composite();
    let result = evaluate(
        &composite,
        &ViewSpec::Assets(vec!["a".into(), "b".into()]),
        NonFinitePolicy::default(),
    );
    assert!(matches!(result, Err(MosaicError::InvalidParameter { .. })));
}

// ============================================================================
// Georeferencing
// ============================================================================

#[test]
fn test_world_file_round_trip() {
    let geo = georeference(
        &BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        CrsCode::Epsg4326,
        100,
        100,
    )
    .unwrap();

    let text = geo.world_file();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[1], "0.0");
    assert_eq!(lines[2], "0.0");
    assert_approx_eq!(lines[0].parse::<f64>().unwrap(), 0.01, 1e-12);
    assert_approx_eq!(lines[3].parse::<f64>().unwrap(), -0.01, 1e-12);

    let parsed = GeoReference::from_world_file(&text, 100, 100).unwrap();
    let bounds = parsed.bounds();
    assert_approx_eq!(bounds.min_x, 0.0, 1e-9);
    assert_approx_eq!(bounds.min_y, 0.0, 1e-9);
    assert_approx_eq!(bounds.max_x, 1.0, 1e-9);
    assert_approx_eq!(bounds.max_y, 1.0, 1e-9);
    assert_eq!(parsed.south_west, geo.south_west);
    assert_eq!(parsed.north_east, geo.north_east);
}

#[test]
fn test_web_mercator_bounds_become_geographic() {
    let geo = georeference(
        &BoundingBox::new(0.0, 0.0, 111_319.490_793, 111_325.142_866),
        CrsCode::Epsg3857,
        10,
        10,
    )
    .unwrap();

    assert_approx_eq!(geo.south_west[0], 0.0, 1e-6);
    assert_approx_eq!(geo.south_west[1], 0.0, 1e-6);
    assert_approx_eq!(geo.north_east[0], 1.0, 1e-4);
    assert_approx_eq!(geo.north_east[1], 1.0, 1e-4);
}
