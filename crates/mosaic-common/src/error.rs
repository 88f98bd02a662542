//! Error types for the mosaic pipeline.

use thiserror::Error;

/// Result type alias using MosaicError.
pub type MosaicResult<T> = Result<T, MosaicError>;

/// Broad classes of failure, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input. Never retried.
    Configuration,
    /// Nothing to composite for the request.
    EmptyResult,
    /// A collaborator or capability outside the core failed.
    External,
    /// Bug or unexpected state inside the core.
    Internal,
}

/// Primary error type for mosaic operations.
#[derive(Debug, Error)]
pub enum MosaicError {
    // === Configuration Errors ===
    #[error("Requested format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown band: {band} (available: {available})")]
    UnknownBand { band: String, available: String },

    #[error("Invalid value range: {0}")]
    InvalidRange(String),

    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Region too large: {area_ha:.1} ha exceeds the {max_ha} ha limit")]
    RegionTooLarge { area_ha: f64, max_ha: u64 },

    // === Empty Results ===
    #[error("No input to composite: {0}")]
    EmptyInput(String),

    // === External Capability Errors ===
    #[error("Resolution enhancement unavailable: {0}")]
    EnhancementUnavailable(String),

    #[error("Tile read failed for scene {scene}: {message}")]
    TileRead { scene: String, message: String },

    // === Internal Errors ===
    #[error("Fragment grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Encoding failed: {0}")]
    EncodeError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MosaicError {
    /// Shorthand for an `UnknownBand` error listing the bands that exist.
    pub fn unknown_band(band: impl Into<String>, available: &[String]) -> Self {
        MosaicError::UnknownBand {
            band: band.into(),
            available: available.join(", "),
        }
    }

    /// Shorthand for an `InvalidParameter` error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        MosaicError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MosaicError::UnsupportedFormat(_)
            | MosaicError::UnknownBand { .. }
            | MosaicError::InvalidRange(_)
            | MosaicError::InvalidExpression { .. }
            | MosaicError::InvalidParameter { .. }
            | MosaicError::InvalidGeometry(_)
            | MosaicError::UnsupportedCrs(_)
            | MosaicError::RegionTooLarge { .. } => ErrorKind::Configuration,

            MosaicError::EmptyInput(_) => ErrorKind::EmptyResult,

            MosaicError::EnhancementUnavailable(_) | MosaicError::TileRead { .. } => {
                ErrorKind::External
            }

            MosaicError::GridMismatch(_)
            | MosaicError::EncodeError(_)
            | MosaicError::ArchiveError(_)
            | MosaicError::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            MosaicError::UnsupportedFormat(_) => "UnsupportedFormat",
            MosaicError::UnknownBand { .. } => "UnknownBand",
            MosaicError::InvalidRange(_) => "InvalidRange",
            MosaicError::InvalidExpression { .. } => "InvalidExpression",
            MosaicError::InvalidParameter { .. } => "InvalidParameter",
            MosaicError::InvalidGeometry(_) => "InvalidGeometry",
            MosaicError::UnsupportedCrs(_) => "UnsupportedCrs",
            MosaicError::RegionTooLarge { .. } => "RegionTooLarge",
            MosaicError::EmptyInput(_) => "EmptyInput",
            MosaicError::EnhancementUnavailable(_) => "EnhancementUnavailable",
            MosaicError::TileRead { .. } => "TileReadFailed",
            MosaicError::GridMismatch(_) => "GridMismatch",
            MosaicError::EncodeError(_) => "EncodeError",
            MosaicError::ArchiveError(_) => "ArchiveError",
            MosaicError::InternalError(_) => "InternalError",
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for MosaicError {
    fn from(err: std::io::Error) -> Self {
        MosaicError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for MosaicError {
    fn from(err: serde_json::Error) -> Self {
        MosaicError::InternalError(format!("JSON error: {}", err))
    }
}

impl From<image::ImageError> for MosaicError {
    fn from(err: image::ImageError) -> Self {
        MosaicError::EncodeError(err.to_string())
    }
}

impl From<zip::result::ZipError> for MosaicError {
    fn from(err: zip::result::ZipError) -> Self {
        MosaicError::ArchiveError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_match_taxonomy() {
        assert_eq!(
            MosaicError::UnsupportedFormat("BMP".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            MosaicError::EmptyInput("no scenes".into()).kind(),
            ErrorKind::EmptyResult
        );
        assert_eq!(
            MosaicError::EnhancementUnavailable("16-bit".into()).kind(),
            ErrorKind::External
        );
        assert_eq!(
            MosaicError::unknown_band("nir", &["red".into()]).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_unknown_band_message_lists_available() {
        let err = MosaicError::unknown_band("nir", &["red".into(), "green".into()]);
        assert_eq!(err.to_string(), "Unknown band: nir (available: red, green)");
        assert_eq!(err.code(), "UnknownBand");
    }
}
