//! Common types and utilities shared across the mosaic pipeline crates.

pub mod bbox;
pub mod catalog;
pub mod credentials;
pub mod crs;
pub mod error;
pub mod geojson;
pub mod grid;
pub mod polygon;
pub mod raster;
pub mod time;

pub use bbox::BoundingBox;
pub use catalog::{Credentials, SceneCatalog, SceneDescriptor, SceneQuery, TileReader};
pub use credentials::CredentialScope;
pub use crs::CrsCode;
pub use error::{ErrorKind, MosaicError, MosaicResult};
pub use geojson::{Feature, FeatureCollection, Geometry};
pub use grid::GeoTransform;
pub use polygon::Region;
pub use raster::{CompositeRaster, RasterFragment};
pub use time::TimeRange;
