//! Coordinate reference system transformations.
//!
//! Implements the inverse projections needed to express raster bounds in
//! geographic coordinates, from scratch without external dependencies.

pub mod mercator;
pub mod transform;
pub mod utm;

pub use mercator::WebMercator;
pub use transform::{
    from_geographic, reproject_point, to_geographic, transform_bounds, DEFAULT_DENSIFY_POINTS,
};
pub use utm::TransverseMercator;
