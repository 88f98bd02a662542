//! Input value ranges and linear rescaling to display bytes.

use ndarray::{ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};

/// Decimal places kept when an automatic range is reported.
pub const DEFAULT_RANGE_PRECISION: u32 = 5;

/// Inclusive range of input values mapped onto 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct ValueRange {
    min: f64,
    max: f64,
}

impl ValueRange {
    /// Create a range, rejecting inverted or non-finite bounds.
    pub fn new(min: f64, max: f64) -> MosaicResult<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(MosaicError::InvalidRange(format!(
                "bounds must be finite, got ({}, {})",
                min, max
            )));
        }
        if min > max {
            return Err(MosaicError::InvalidRange(format!(
                "min {} is greater than max {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Min and max over pixels that are valid in `mask` and not `nodata`,
    /// rounded to `precision` decimal places.
    ///
    /// Non-finite values are ignored. Fails with `EmptyInput` when no pixel
    /// qualifies.
    pub fn auto(
        data: ArrayView3<'_, f32>,
        mask: ArrayView2<'_, bool>,
        nodata: f32,
        precision: u32,
    ) -> MosaicResult<Self> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        for channel in data.outer_iter() {
            for (&value, &valid) in channel.iter().zip(mask.iter()) {
                if !valid || value == nodata || !value.is_finite() {
                    continue;
                }
                min = min.min(value);
                max = max.max(value);
            }
        }

        if min > max {
            return Err(MosaicError::EmptyInput(
                "no valid pixels to compute a value range from".to_string(),
            ));
        }

        let factor = 10f64.powi(precision as i32);
        let round = |v: f32| (v as f64 * factor).round() / factor;
        let range = Self::new(round(min), round(max))?;

        tracing::debug!(min = range.min, max = range.max, "Computed automatic value range");
        Ok(range)
    }

    /// Position of `value` within the range, clamped to 0.0-1.0.
    ///
    /// A zero-width range is treated as one unit wide.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let width = self.max - self.min;
        let width = if width.abs() < 1e-12 { 1.0 } else { width };
        (((value as f64 - self.min) / width) as f32).clamp(0.0, 1.0)
    }

    /// Rescale `value` linearly into 0-255.
    #[inline]
    pub fn rescale(&self, value: f32) -> u8 {
        if value.is_nan() {
            return 0;
        }
        (self.normalize(value) * 255.0).round() as u8
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 4000.0 }
    }
}

impl TryFrom<[f64; 2]> for ValueRange {
    type Error = MosaicError;

    fn try_from([min, max]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<ValueRange> for [f64; 2] {
    fn from(range: ValueRange) -> Self {
        [range.min, range.max]
    }
}
