//! Display contrast operations for three-channel views.
//!
//! A formula is written as a sequence of operations, e.g.
//! `sigmoidal RGB 6 0.1 gamma G 1.1 gamma B 1.2 saturation 1.2`.
//! Regardless of the written order, operations run in stages:
//! all sigmoidal operations first, then gamma, then saturation.
//! Values are handled as 0.0-1.0 floats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};

/// Formula applied to RGB views when a request does not name one.
pub const DEFAULT_COLOR_FORMULA: &str = "sigmoidal RGB 6 0.1 gamma G 1.1 gamma B 1.2 saturation 1.2";

/// Channel selection for per-channel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub r: bool,
    pub g: bool,
    pub b: bool,
}

impl Channels {
    pub const ALL: Channels = Channels { r: true, g: true, b: true };

    fn parse(token: &str) -> Option<Self> {
        let mut channels = Channels { r: false, g: false, b: false };
        for c in token.chars() {
            match c.to_ascii_uppercase() {
                'R' => channels.r = true,
                'G' => channels.g = true,
                'B' => channels.b = true,
                _ => return None,
            }
        }
        if token.is_empty() {
            return None;
        }
        Some(channels)
    }

    fn mask(&self) -> [bool; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, name) in self.mask().iter().zip(["R", "G", "B"]) {
            if *on {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// One contrast operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorOperation {
    /// Sigmoidal contrast stretch with `contrast` (slope) and `bias` (midpoint).
    Sigmoidal { channels: Channels, contrast: f32, bias: f32 },
    /// Power-law brightness curve, `v^(1/gamma)`.
    Gamma { channels: Channels, gamma: f32 },
    /// Chroma scaling around per-pixel luma.
    Saturation { proportion: f32 },
}

impl ColorOperation {
    fn stage(&self) -> u8 {
        match self {
            ColorOperation::Sigmoidal { .. } => 0,
            ColorOperation::Gamma { .. } => 1,
            ColorOperation::Saturation { .. } => 2,
        }
    }

    fn apply(&self, rgb: &mut [f32; 3]) {
        match *self {
            ColorOperation::Sigmoidal { channels, contrast, bias } => {
                for (v, on) in rgb.iter_mut().zip(channels.mask()) {
                    if on {
                        *v = sigmoidal(*v, contrast, bias);
                    }
                }
            }
            ColorOperation::Gamma { channels, gamma } => {
                for (v, on) in rgb.iter_mut().zip(channels.mask()) {
                    if on {
                        *v = v.max(0.0).powf(1.0 / gamma);
                    }
                }
            }
            ColorOperation::Saturation { proportion } => {
                let luma = 0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2];
                for v in rgb.iter_mut() {
                    *v = luma + (*v - luma) * proportion;
                }
            }
        }
        for v in rgb.iter_mut() {
            *v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        }
    }
}

impl fmt::Display for ColorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorOperation::Sigmoidal { channels, contrast, bias } => {
                write!(f, "sigmoidal {} {} {}", channels, contrast, bias)
            }
            ColorOperation::Gamma { channels, gamma } => write!(f, "gamma {} {}", channels, gamma),
            ColorOperation::Saturation { proportion } => write!(f, "saturation {}", proportion),
        }
    }
}

/// Sigmoidal contrast curve mapping 0 to 0 and 1 to 1.
fn sigmoidal(x: f32, contrast: f32, bias: f32) -> f32 {
    if contrast == 0.0 {
        return x;
    }
    let (alpha, beta) = (bias as f64, contrast as f64);
    let x = x as f64;
    let logistic = |t: f64| 1.0 / (1.0 + t.exp());

    let out = if beta > 0.0 {
        let numerator = logistic(beta * (alpha - x)) - logistic(beta * alpha);
        let denominator = logistic(beta * (alpha - 1.0)) - logistic(beta * alpha);
        numerator / denominator
    } else {
        let inner = x / (1.0 + (beta * alpha - beta).exp()) - x / (1.0 + (beta * alpha).exp())
            + 1.0 / (1.0 + (beta * alpha).exp());
        (beta * alpha - (1.0 / inner - 1.0).ln()) / beta
    };
    out as f32
}

/// Ordered list of contrast operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFormula {
    operations: Vec<ColorOperation>,
}

impl ColorFormula {
    pub fn new(operations: Vec<ColorOperation>) -> Self {
        Self { operations }
    }

    /// Parse a formula string. Operation names and channels are case-insensitive.
    pub fn parse(formula: &str) -> MosaicResult<Self> {
        let invalid = |message: String| MosaicError::InvalidParameter {
            param: "color_formula".to_string(),
            message,
        };
        let number = |token: Option<&str>, what: &str| -> MosaicResult<f32> {
            let token = token.ok_or_else(|| invalid(format!("missing {}", what)))?;
            token
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(format!("{} '{}' is not a number", what, token)))
        };
        let channels = |token: Option<&str>| -> MosaicResult<Channels> {
            let token = token.ok_or_else(|| invalid("missing channel list".to_string()))?;
            Channels::parse(token).ok_or_else(|| invalid(format!("bad channel list '{}'", token)))
        };

        let mut tokens = formula.split_whitespace();
        let mut operations = Vec::new();

        while let Some(op) = tokens.next() {
            let operation = match op.to_ascii_lowercase().as_str() {
                "sigmoidal" => ColorOperation::Sigmoidal {
                    channels: channels(tokens.next())?,
                    contrast: number(tokens.next(), "sigmoidal contrast")?,
                    bias: number(tokens.next(), "sigmoidal bias")?,
                },
                "gamma" => {
                    let channels = channels(tokens.next())?;
                    let gamma = number(tokens.next(), "gamma")?;
                    if gamma <= 0.0 {
                        return Err(invalid(format!("gamma must be positive, got {}", gamma)));
                    }
                    ColorOperation::Gamma { channels, gamma }
                }
                "saturation" => {
                    let proportion = number(tokens.next(), "saturation")?;
                    if proportion < 0.0 {
                        return Err(invalid(format!(
                            "saturation must not be negative, got {}",
                            proportion
                        )));
                    }
                    ColorOperation::Saturation { proportion }
                }
                other => return Err(invalid(format!("unknown operation '{}'", other))),
            };
            operations.push(operation);
        }

        Ok(Self { operations })
    }

    pub fn operations(&self) -> &[ColorOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Apply every operation to one pixel (channels in 0.0-1.0).
    pub fn apply(&self, rgb: &mut [f32; 3]) {
        for stage in 0..3 {
            for op in self.operations.iter().filter(|op| op.stage() == stage) {
                op.apply(rgb);
            }
        }
    }
}

impl Default for ColorFormula {
    fn default() -> Self {
        // The default formula is a valid constant.
        Self::parse(DEFAULT_COLOR_FORMULA).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}

impl fmt::Display for ColorFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.operations.iter().map(|op| op.to_string()).collect();
        f.write_str(&parts.join(" "))
    }
}

impl FromStr for ColorFormula {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ColorFormula {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColorFormula {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
