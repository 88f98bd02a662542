//! Turning evaluated rasters into images and vector contours.
//!
//! - Value range scaling ([`range`])
//! - Color formulas for RGB views ([`color_formula`])
//! - Colormaps for scalar views ([`colormap`])
//! - PNG encoding ([`png`]) and the render pipeline ([`render`])
//! - Quantized contour lines and peaks (marching squares, [`contour`])

pub mod color_formula;
pub mod colormap;
pub mod contour;
pub mod png;
pub mod range;
pub mod render;

pub use color_formula::{ColorFormula, ColorOperation, DEFAULT_COLOR_FORMULA};
pub use colormap::Colormap;
pub use contour::{ContourExtractor, ContourLine, ContourParams, ContourSet, Peak};
pub use range::ValueRange;
pub use render::{render, ColorTreatment, ImageFormat, RenderOptions, RenderOutput, RenderedImage};
