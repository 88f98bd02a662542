//! Contour extraction over a composite band.

use mosaic_common::{CompositeRaster, MosaicError, MosaicResult, Region};
use renderer::{ContourSet, ContourExtractor};

use crate::config::{ContourRequest, PipelineConfig};

/// Extract quantized contour lines and peaks from one band of `composite`.
///
/// Uses the band named in the request, or the composite's first band.
pub fn extract(
    composite: &CompositeRaster,
    request: &ContourRequest,
    region: &Region,
    config: &PipelineConfig,
) -> MosaicResult<ContourSet> {
    let band = match &request.band {
        Some(band) => band.as_str(),
        None => composite
            .bands()
            .first()
            .map(String::as_str)
            .ok_or_else(|| MosaicError::EmptyInput("composite has no bands".to_string()))?,
    };
    let values = composite.band(band)?;

    let extractor = ContourExtractor {
        params: request.params,
        peak_window: config.peak_window,
        max_peaks: config.max_peaks,
        nodata: composite.nodata(),
    };
    let set = extractor.extract(
        values,
        composite.mask().view(),
        &composite.transform(),
        composite.crs(),
        region,
    )?;

    tracing::debug!(
        band,
        gap = request.params.gap,
        lines = set.lines.len(),
        peaks = set.peaks.len(),
        "Extracted contours"
    );
    Ok(set)
}
