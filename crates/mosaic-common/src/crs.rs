//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CRS codes the pipeline can reproject from.
///
/// Tile readers report the native CRS of each fragment; optical scenes are
/// usually delivered in UTM, some mosaics in Web Mercator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// WGS84 / UTM, EPSG:326xx (north) or EPSG:327xx (south)
    Utm { zone: u8, north: bool },
}

impl CrsCode {
    /// Parse a CRS string such as "EPSG:4326", "epsg:32633" or "CRS:84".
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "OGC:CRS84" => return Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => return Ok(CrsCode::Epsg3857),
            _ => {}
        }

        let code: u32 = normalized
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| CrsParseError::UnsupportedCrs(s.to_string()))?;

        let (zone, north) = match code {
            32601..=32660 => (code - 32600, true),
            32701..=32760 => (code - 32700, false),
            _ => return Err(CrsParseError::UnsupportedCrs(s.to_string())),
        };

        Ok(CrsCode::Utm {
            zone: zone as u8,
            north,
        })
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Utm { zone, north: true } => 32600 + *zone as u32,
            CrsCode::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&s)
    }
}

impl From<CrsCode> for String {
    fn from(crs: CrsCode) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

impl From<CrsParseError> for crate::MosaicError {
    fn from(err: CrsParseError) -> Self {
        match err {
            CrsParseError::UnsupportedCrs(s) => crate::MosaicError::UnsupportedCrs(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_known() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("crs:84").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("EPSG:900913").unwrap(), CrsCode::Epsg3857);
    }

    #[test]
    fn test_parse_utm() {
        assert_eq!(
            CrsCode::parse("EPSG:32633").unwrap(),
            CrsCode::Utm { zone: 33, north: true }
        );
        assert_eq!(
            CrsCode::parse("epsg:32723").unwrap(),
            CrsCode::Utm { zone: 23, north: false }
        );
        assert!(CrsCode::parse("EPSG:32661").is_err());
        assert!(CrsCode::parse("EPSG:2154").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for code in ["EPSG:4326", "EPSG:3857", "EPSG:32618", "EPSG:32755"] {
            assert_eq!(CrsCode::parse(code).unwrap().to_string(), code);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CrsCode::Utm { zone: 31, north: true }).unwrap();
        assert_eq!(json, "\"EPSG:32631\"");
        let back: CrsCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CrsCode::Utm { zone: 31, north: true });
    }
}
