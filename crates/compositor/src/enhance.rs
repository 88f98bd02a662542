//! Resolution enhancement: repeated 4x upsampling that keeps the alpha mask.
//!
//! Each pass decodes the image, upsamples the color channels through an
//! [`Upsampler`], resizes the alpha channel with nearest neighbour so that
//! mask edges stay hard, and encodes the result in the input format.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat as CodecFormat, RgbImage};
use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};
use renderer::render::encode_rgba;
use renderer::{ImageFormat, RenderedImage};

/// Scale factor of a single pass, per axis.
pub const UPSCALE: u32 = 4;

/// Super-resolution capability: returns an image exactly [`UPSCALE`] times
/// larger on both axes.
pub trait Upsampler: Send + Sync {
    fn upsample(&self, rgb: &RgbImage) -> MosaicResult<RgbImage>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Built-in upsampler using separable interpolation from the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct InterpolatingUpsampler {
    filter: FilterType,
}

impl Default for InterpolatingUpsampler {
    fn default() -> Self {
        Self {
            filter: FilterType::CatmullRom,
        }
    }
}

impl Upsampler for InterpolatingUpsampler {
    fn upsample(&self, rgb: &RgbImage) -> MosaicResult<RgbImage> {
        Ok(imageops::resize(
            rgb,
            rgb.width() * UPSCALE,
            rgb.height() * UPSCALE,
            self.filter,
        ))
    }

    fn name(&self) -> &str {
        "interpolating"
    }
}

/// Requested enhancement as a number of 4x passes.
///
/// Parsed from factor tags (`"1x"`, `"4x"`, `"16x"`, `"64x"`) or a bare
/// pass count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct EnhanceFactor {
    passes: u32,
}

impl EnhanceFactor {
    /// Largest accepted factor is 4^MAX_PASSES.
    pub const MAX_PASSES: u32 = 4;

    pub fn from_passes(passes: u32) -> MosaicResult<Self> {
        if passes > Self::MAX_PASSES {
            return Err(MosaicError::invalid_parameter(
                "enhance",
                format!("at most {} passes supported, got {}", Self::MAX_PASSES, passes),
            ));
        }
        Ok(Self { passes })
    }

    /// Parse a factor tag such as `"16x"`. The factor must be a power of four.
    pub fn parse(s: &str) -> MosaicResult<Self> {
        let trimmed = s.trim().trim_end_matches(['x', 'X']);
        let factor: u32 = trimmed.parse().map_err(|_| {
            MosaicError::invalid_parameter("enhance", format!("'{}' is not a factor like 16x", s))
        })?;

        let mut passes = 0;
        let mut remaining = factor;
        while remaining > 1 && remaining % UPSCALE == 0 {
            remaining /= UPSCALE;
            passes += 1;
        }
        if factor == 0 || remaining != 1 {
            return Err(MosaicError::invalid_parameter(
                "enhance",
                format!("factor {} is not a power of {}", factor, UPSCALE),
            ));
        }
        Self::from_passes(passes)
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Total scale per axis.
    pub fn factor(&self) -> u32 {
        UPSCALE.pow(self.passes)
    }
}

impl fmt::Display for EnhanceFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

impl FromStr for EnhanceFactor {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<serde_json::Value> for EnhanceFactor {
    type Error = MosaicError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Self::parse(&s),
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|p| u32::try_from(p).ok())
                .ok_or_else(|| {
                    MosaicError::invalid_parameter("enhance", format!("bad pass count {}", n))
                })
                .and_then(Self::from_passes),
            other => Err(MosaicError::invalid_parameter(
                "enhance",
                format!("expected a factor tag or pass count, got {}", other),
            )),
        }
    }
}

impl From<EnhanceFactor> for String {
    fn from(factor: EnhanceFactor) -> Self {
        factor.to_string()
    }
}

/// Applies [`Upsampler`] passes to rendered images.
pub struct Enhancer {
    upsampler: Box<dyn Upsampler>,
    jpeg_quality: u8,
}

impl Default for Enhancer {
    fn default() -> Self {
        Self::new(Box::new(InterpolatingUpsampler::default()))
    }
}

impl Enhancer {
    pub fn new(upsampler: Box<dyn Upsampler>) -> Self {
        Self {
            upsampler,
            jpeg_quality: 85,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Run `passes` enhancement passes. Zero passes return the input as is.
    pub fn enhance(&self, image: &RenderedImage, passes: u32) -> MosaicResult<RenderedImage> {
        let mut current = image.clone();
        for pass in 0..passes {
            current = self.enhance_once(&current)?;
            tracing::debug!(
                pass = pass + 1,
                passes,
                width = current.width,
                height = current.height,
                upsampler = self.upsampler.name(),
                "Enhanced image"
            );
        }
        Ok(current)
    }

    fn enhance_once(&self, image: &RenderedImage) -> MosaicResult<RenderedImage> {
        let codec = match image.format {
            ImageFormat::Png => CodecFormat::Png,
            ImageFormat::Jpeg => CodecFormat::Jpeg,
        };
        let decoded = image::load_from_memory_with_format(&image.bytes, codec)
            .map_err(|e| MosaicError::EnhancementUnavailable(format!("cannot decode image: {}", e)))?;

        let (rgb, alpha) = split_alpha(decoded)?;
        let (width, height) = rgb.dimensions();
        let (new_width, new_height) = (width * UPSCALE, height * UPSCALE);

        let upsampled = self.upsampler.upsample(&rgb)?;
        if upsampled.dimensions() != (new_width, new_height) {
            return Err(MosaicError::EnhancementUnavailable(format!(
                "{} upsampler returned {:?} for a {}x{} input",
                self.upsampler.name(),
                upsampled.dimensions(),
                width,
                height
            )));
        }
        let alpha = alpha.map(|a| imageops::resize(&a, new_width, new_height, FilterType::Nearest));

        let mut rgba = Vec::with_capacity(new_width as usize * new_height as usize * 4);
        for (i, px) in upsampled.pixels().enumerate() {
            let a = match &alpha {
                Some(alpha) => alpha.as_raw()[i],
                None => 255,
            };
            rgba.extend_from_slice(&[px[0], px[1], px[2], a]);
        }

        let bytes = encode_rgba(
            &rgba,
            new_width as usize,
            new_height as usize,
            image.format,
            self.jpeg_quality,
        )?;
        Ok(RenderedImage {
            bytes,
            width: new_width,
            height: new_height,
            format: image.format,
        })
    }
}

/// Separate color from alpha. Only 8-bit RGB and RGBA layouts are usable.
fn split_alpha(decoded: DynamicImage) -> MosaicResult<(RgbImage, Option<GrayImage>)> {
    match decoded {
        DynamicImage::ImageRgb8(rgb) => Ok((rgb, None)),
        DynamicImage::ImageRgba8(rgba) => {
            let (width, height) = rgba.dimensions();
            let mut rgb = RgbImage::new(width, height);
            let mut alpha = GrayImage::new(width, height);
            for (x, y, px) in rgba.enumerate_pixels() {
                rgb.put_pixel(x, y, image::Rgb([px[0], px[1], px[2]]));
                alpha.put_pixel(x, y, image::Luma([px[3]]));
            }
            Ok((rgb, Some(alpha)))
        }
        other => Err(MosaicError::EnhancementUnavailable(format!(
            "unsupported pixel layout {:?}, expected 8-bit RGB or RGBA",
            other.color()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_tags() {
        assert_eq!(EnhanceFactor::parse("1x").unwrap().passes(), 0);
        assert_eq!(EnhanceFactor::parse("4x").unwrap().passes(), 1);
        assert_eq!(EnhanceFactor::parse("16x").unwrap().passes(), 2);
        assert_eq!(EnhanceFactor::parse("64X").unwrap().passes(), 3);
        assert!(EnhanceFactor::parse("8x").is_err());
        assert!(EnhanceFactor::parse("0x").is_err());
        assert!(EnhanceFactor::parse("huge").is_err());
        assert_eq!(EnhanceFactor::parse("16x").unwrap().to_string(), "16x");
    }

    #[test]
    fn test_factor_serde() {
        let f: EnhanceFactor = serde_json::from_str(r#""4x""#).unwrap();
        assert_eq!(f.passes(), 1);
        let f: EnhanceFactor = serde_json::from_str("2").unwrap();
        assert_eq!(f.factor(), 16);
        assert!(serde_json::from_str::<EnhanceFactor>("9").is_err());
    }

    #[test]
    fn test_gray_images_unusable() {
        let gray = DynamicImage::ImageLuma16(image::ImageBuffer::new(2, 2));
        assert!(matches!(
            split_alpha(gray),
            Err(MosaicError::EnhancementUnavailable(_))
        ));
    }
}
