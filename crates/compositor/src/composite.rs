//! Composite builder: merges per-scene fragments onto one grid.
//!
//! Fragments arrive in priority order. The output grid is the first
//! fragment's grid, and every pixel takes its value from the first fragment
//! that has a valid sample there. Nothing is blended.

use ndarray::{Array2, Array3};

use mosaic_common::{
    CompositeRaster, GeoTransform, MosaicError, MosaicResult, RasterFragment, Region,
};
use projection::{reproject_point, transform_bounds, DEFAULT_DENSIFY_POINTS};

/// Value written to pixels no fragment covers.
pub const DEFAULT_NODATA: f32 = 0.0;

/// Merge `fragments` with the default no-data sentinel.
pub fn build(fragments: &[RasterFragment], region: &Region) -> MosaicResult<CompositeRaster> {
    CompositeBuilder::new().build(fragments, region)
}

/// First-valid-wins mosaic builder.
#[derive(Debug, Clone, Copy)]
pub struct CompositeBuilder {
    nodata: f32,
}

impl Default for CompositeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeBuilder {
    pub fn new() -> Self {
        Self {
            nodata: DEFAULT_NODATA,
        }
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = nodata;
        self
    }

    /// Merge fragments onto the grid of the first one that touches `region`.
    ///
    /// Fragments whose footprint misses the region are skipped. Merging stops
    /// early once every pixel is valid; the scene identifiers of the
    /// composite are the fragments merged up to that point, in order.
    pub fn build(
        &self,
        fragments: &[RasterFragment],
        region: &Region,
    ) -> MosaicResult<CompositeRaster> {
        if fragments.is_empty() {
            return Err(MosaicError::EmptyInput(
                "no fragments to composite".to_string(),
            ));
        }

        let region_bbox = region.bbox();
        let mut usable = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            fragment.validate()?;
            let footprint = transform_bounds(&fragment.bounds, fragment.crs, DEFAULT_DENSIFY_POINTS)?;
            if footprint.intersects(&region_bbox) {
                usable.push(fragment);
            } else {
                tracing::warn!(
                    scene = %fragment.scene_id,
                    "Skipping fragment outside the requested region"
                );
            }
        }

        let base = *usable.first().ok_or_else(|| {
            MosaicError::EmptyInput(format!(
                "none of the {} fragments intersect the region",
                fragments.len()
            ))
        })?;

        let bands = base.bands.clone();
        let target = base.transform();
        let (height, width) = (base.height(), base.width());

        let mut data = Array3::from_elem((bands.len(), height, width), self.nodata);
        let mut mask = Array2::from_elem((height, width), false);
        let mut remaining = height * width;
        let mut scene_ids = Vec::new();

        for fragment in usable {
            if remaining == 0 {
                break;
            }
            let band_map = band_mapping(&bands, fragment)?;
            let filled = if fragment.crs == base.crs && fragment.transform().same_grid(&target) {
                merge_aligned(&mut data, &mut mask, fragment, &band_map)
            } else {
                merge_resampled(&mut data, &mut mask, &target, base, fragment, &band_map)
            };
            remaining -= filled;
            scene_ids.push(fragment.scene_id.clone());

            tracing::debug!(
                scene = %fragment.scene_id,
                filled,
                remaining,
                "Merged fragment"
            );
        }

        let composite = CompositeRaster::new(
            data,
            mask,
            base.bounds,
            base.crs,
            bands,
            scene_ids,
            self.nodata,
        )?;

        tracing::debug!(
            width,
            height,
            scenes = composite.scene_ids().len(),
            valid = composite.valid_count(),
            "Built composite"
        );

        Ok(composite)
    }
}

/// Index of each composite band inside `fragment`.
fn band_mapping(bands: &[String], fragment: &RasterFragment) -> MosaicResult<Vec<usize>> {
    bands
        .iter()
        .map(|band| {
            fragment.band_index(band).ok_or_else(|| {
                MosaicError::GridMismatch(format!(
                    "fragment {} lacks band {} (has {})",
                    fragment.scene_id,
                    band,
                    fragment.bands.join(", ")
                ))
            })
        })
        .collect()
}

/// Copy valid samples of a fragment sharing the composite grid.
fn merge_aligned(
    data: &mut Array3<f32>,
    mask: &mut Array2<bool>,
    fragment: &RasterFragment,
    band_map: &[usize],
) -> usize {
    let mut filled = 0;
    for ((row, col), valid) in mask.indexed_iter_mut() {
        if *valid || !fragment.mask[[row, col]] {
            continue;
        }
        for (band, &src) in band_map.iter().enumerate() {
            data[[band, row, col]] = fragment.data[[src, row, col]];
        }
        *valid = true;
        filled += 1;
    }
    filled
}

/// Nearest-neighbour resample of a fragment on another grid or CRS.
fn merge_resampled(
    data: &mut Array3<f32>,
    mask: &mut Array2<bool>,
    target: &GeoTransform,
    base: &RasterFragment,
    fragment: &RasterFragment,
    band_map: &[usize],
) -> usize {
    let source = fragment.transform();
    let mut filled = 0;
    for ((row, col), valid) in mask.indexed_iter_mut() {
        if *valid {
            continue;
        }
        let (x, y) = target.pixel_center(col, row);
        let (sx, sy) = reproject_point(base.crs, fragment.crs, x, y);
        let Some((src_col, src_row)) = source.coord_to_index(sx, sy) else {
            continue;
        };
        if !fragment.mask[[src_row, src_col]] {
            continue;
        }
        for (band, &src) in band_map.iter().enumerate() {
            data[[band, row, col]] = fragment.data[[src, src_row, src_col]];
        }
        *valid = true;
        filled += 1;
    }
    filled
}
