//! Satellite mosaic composition.
//!
//! Turns per-scene raster fragments into a delivered image:
//!
//! ```text
//! SceneCatalog::search
//!      │
//!      ▼
//! TileReader::read (per scene, in parallel)
//!      │
//!      ▼
//! composite::build ──► view::evaluate ──► renderer::render
//!                                              │
//!                                              ▼
//!                                     Enhancer::enhance (optional)
//!                                              │
//!                                              ▼
//!          georef::georeference ──► package::package ──► DeliveryBundle
//!                                              ▲
//!                     contours::extract ───────┘ (optional)
//! ```
//!
//! [`Pipeline`] wires the stages together for a [`RenderRequest`].

pub mod composite;
pub mod config;
pub mod contours;
pub mod enhance;
pub mod expression;
pub mod georef;
pub mod package;
pub mod pipeline;
pub mod view;

pub use composite::{build, CompositeBuilder, DEFAULT_NODATA};
pub use config::{ContourRequest, PipelineConfig, RenderPlan, RenderRequest};
pub use enhance::{EnhanceFactor, Enhancer, InterpolatingUpsampler, Upsampler, UPSCALE};
pub use expression::{Expression, NonFinitePolicy};
pub use georef::{georeference, GeoReference, BOUNDS_PRECISION};
pub use package::{package, DeliveryBundle};
pub use pipeline::{Frame, Pipeline};
pub use view::{evaluate, EvaluatedView, ViewSpec};
