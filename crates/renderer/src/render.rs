//! Render pipeline: value range, color treatment, alpha, encoding.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayView2, ArrayView3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};

use crate::png::encode_png;
use crate::range::DEFAULT_RANGE_PRECISION;
use crate::{ColorFormula, Colormap, ValueRange};

/// Output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Parse a format name. Anything but PNG or JPEG is rejected.
    pub fn parse(s: &str) -> MosaicResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PNG" => Ok(ImageFormat::Png),
            "JPEG" | "JPG" => Ok(ImageFormat::Jpeg),
            _ => Err(MosaicError::UnsupportedFormat(s.to_string())),
        }
    }

    /// Image file extension inside delivery bundles.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// Matching world-file extension.
    pub fn world_file_extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "pgw",
            ImageFormat::Jpeg => "jgw",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
        })
    }
}

impl FromStr for ImageFormat {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageFormat {
    type Error = MosaicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ImageFormat> for String {
    fn from(format: ImageFormat) -> Self {
        format.to_string()
    }
}

/// How display bytes become colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTreatment {
    /// Contrast operations for three-channel views.
    ColorFormula(ColorFormula),
    /// Lookup table for single-channel views.
    Colormap(Colormap),
}

impl ColorTreatment {
    /// Treatment used when a request names none.
    pub fn default_for_channels(channels: usize) -> MosaicResult<Self> {
        if channels == 3 {
            Ok(ColorTreatment::ColorFormula(ColorFormula::default()))
        } else {
            Colormap::named("greys").map(ColorTreatment::Colormap)
        }
    }
}

/// Settings shared by every render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Sentinel excluded from automatic ranges.
    pub nodata: f32,
    /// Decimal places kept in automatic ranges.
    pub range_precision: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            nodata: 0.0,
            range_precision: DEFAULT_RANGE_PRECISION,
            jpeg_quality: 85,
        }
    }
}

/// Encoded image plus its pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Result of [`render`]: the image and the range that was actually applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub image: RenderedImage,
    pub range: ValueRange,
}

/// Render an evaluated view.
///
/// `data` has shape `(channels, height, width)` with 1 or 3 channels and
/// `mask` has shape `(height, width)`. With `auto_range` the given `range`
/// is replaced by the min/max of valid pixels; the applied range is returned
/// either way. Three-channel views take a color formula, single-channel views
/// a colormap.
pub fn render(
    data: ArrayView3<'_, f32>,
    mask: ArrayView2<'_, bool>,
    range: ValueRange,
    treatment: &ColorTreatment,
    auto_range: bool,
    format: ImageFormat,
    options: &RenderOptions,
) -> MosaicResult<RenderOutput> {
    let (channels, height, width) = data.dim();
    if width == 0 || height == 0 {
        return Err(MosaicError::EmptyInput(format!(
            "nothing to render in a {}x{} view",
            width, height
        )));
    }
    if mask.dim() != (height, width) {
        return Err(MosaicError::GridMismatch(format!(
            "mask is {:?}, data is {}x{}",
            mask.dim(),
            height,
            width
        )));
    }
    match (channels, treatment) {
        (3, ColorTreatment::ColorFormula(_)) | (1, ColorTreatment::Colormap(_)) => {}
        (3, ColorTreatment::Colormap(_)) => {
            return Err(MosaicError::invalid_parameter(
                "colormap",
                "colormaps apply to single-channel views only",
            ))
        }
        (1, ColorTreatment::ColorFormula(_)) => {
            return Err(MosaicError::invalid_parameter(
                "color_formula",
                "color formulas apply to three-channel views only",
            ))
        }
        (n, _) => {
            return Err(MosaicError::invalid_parameter(
                "view",
                format!("cannot render {} channels, expected 1 or 3", n),
            ))
        }
    }

    let range = if auto_range {
        ValueRange::auto(data, mask, options.nodata, options.range_precision)?
    } else {
        range
    };

    let mut rgba = vec![0u8; width * height * 4];
    rgba.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                if !mask[[y, x]] {
                    continue;
                }
                let rgb = match treatment {
                    ColorTreatment::ColorFormula(formula) => {
                        let mut rgb = [
                            range.normalize(data[[0, y, x]]),
                            range.normalize(data[[1, y, x]]),
                            range.normalize(data[[2, y, x]]),
                        ];
                        formula.apply(&mut rgb);
                        rgb.map(|v| (v * 255.0).round() as u8)
                    }
                    ColorTreatment::Colormap(cmap) => cmap.lookup(range.rescale(data[[0, y, x]])),
                };
                px[..3].copy_from_slice(&rgb);
                px[3] = 255;
            }
        });

    let bytes = encode_rgba(&rgba, width, height, format, options.jpeg_quality)?;

    tracing::debug!(
        width,
        height,
        channels,
        format = %format,
        range_min = range.min(),
        range_max = range.max(),
        bytes = bytes.len(),
        "Rendered image"
    );

    Ok(RenderOutput {
        image: RenderedImage {
            bytes,
            width: width as u32,
            height: height as u32,
            format,
        },
        range,
    })
}

/// Encode an RGBA buffer.
///
/// JPEG has no alpha channel: transparent pixels are written black.
pub fn encode_rgba(
    rgba: &[u8],
    width: usize,
    height: usize,
    format: ImageFormat,
    jpeg_quality: u8,
) -> MosaicResult<Vec<u8>> {
    match format {
        ImageFormat::Png => encode_png(rgba, width, height),
        ImageFormat::Jpeg => {
            if rgba.len() != width * height * 4 || width == 0 || height == 0 {
                return Err(MosaicError::EncodeError(format!(
                    "RGBA buffer holds {} bytes for {}x{}",
                    rgba.len(),
                    width,
                    height
                )));
            }
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| if px[3] == 0 { [0, 0, 0] } else { [px[0], px[1], px[2]] })
                .collect();

            let mut out = Vec::new();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality.clamp(1, 100));
            encoder.encode(&rgb, width as u32, height as u32, image::ColorType::Rgb8)?;
            Ok(out)
        }
    }
}
