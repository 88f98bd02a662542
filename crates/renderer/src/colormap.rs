//! Colormaps for single-channel views.
//!
//! A colormap is a 256-entry lookup table built by linear interpolation
//! between color stops. Built-in maps are selected by name; custom maps are
//! given as a list of hex colors spread evenly over the range.

use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};

/// Names accepted by [`Colormap::named`].
pub const BUILTIN_COLORMAPS: &[&str] = &["greys", "viridis", "rdylgn", "terrain", "magma"];

const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

const RDYLGN: &[&str] = &[
    "#a50026", "#d73027", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#d9ef8b", "#a6d96a",
    "#66bd63", "#1a9850", "#006837",
];

const MAGMA: &[&str] = &[
    "#000004", "#180f3d", "#440f76", "#721f81", "#9e2f7f", "#cd4071", "#f1605d", "#fd9668",
    "#feca8d", "#fcfdbf",
];

/// Terrain stops are unevenly spaced: water, lowland, highland, snow.
const TERRAIN: &[(f32, [u8; 3])] = &[
    (0.0, [51, 51, 153]),
    (0.15, [0, 153, 255]),
    (0.25, [0, 204, 102]),
    (0.5, [255, 255, 153]),
    (0.75, [128, 92, 84]),
    (1.0, [255, 255, 255]),
];

/// Parse a `#rrggbb` (or `rrggbb`) color.
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some([r, g, b])
}

fn rgb_to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Value to color lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: Option<String>,
    stops: Vec<(f32, [u8; 3])>,
    lut: Vec<[u8; 3]>,
}

impl Colormap {
    /// Look up a built-in colormap (case-insensitive).
    pub fn named(name: &str) -> MosaicResult<Self> {
        let key = name.to_ascii_lowercase();
        let stops = match key.as_str() {
            "greys" | "gray" | "grey" => vec![(0.0, [0, 0, 0]), (1.0, [255, 255, 255])],
            "viridis" => even_stops(VIRIDIS)?,
            "rdylgn" => even_stops(RDYLGN)?,
            "magma" => even_stops(MAGMA)?,
            "terrain" => TERRAIN.to_vec(),
            _ => {
                return Err(MosaicError::invalid_parameter(
                    "colormap",
                    format!(
                        "unknown colormap '{}' (available: {})",
                        name,
                        BUILTIN_COLORMAPS.join(", ")
                    ),
                ))
            }
        };
        Ok(Self::build(Some(key), stops))
    }

    /// Build a colormap from two or more hex colors spread evenly over 0-255.
    pub fn from_hex_stops<S: AsRef<str>>(colors: &[S]) -> MosaicResult<Self> {
        if colors.len() < 2 {
            return Err(MosaicError::invalid_parameter(
                "colormap",
                "a custom colormap needs at least two colors",
            ));
        }
        Ok(Self::build(None, even_stops(colors)?))
    }

    fn build(name: Option<String>, stops: Vec<(f32, [u8; 3])>) -> Self {
        let lut = (0..256)
            .map(|i| interpolate_stops(&stops, i as f32 / 255.0))
            .collect();
        Self { name, stops, lut }
    }

    /// Built-in name, `None` for custom maps.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Color for a display byte.
    #[inline]
    pub fn lookup(&self, value: u8) -> [u8; 3] {
        self.lut[value as usize]
    }
}

fn even_stops<S: AsRef<str>>(colors: &[S]) -> MosaicResult<Vec<(f32, [u8; 3])>> {
    let last = (colors.len().max(2) - 1) as f32;
    colors
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let rgb = hex_to_rgb(c.as_ref()).ok_or_else(|| {
                MosaicError::invalid_parameter(
                    "colormap",
                    format!("'{}' is not a #rrggbb color", c.as_ref()),
                )
            })?;
            Ok((i as f32 / last, rgb))
        })
        .collect()
}

fn interpolate_stops(stops: &[(f32, [u8; 3])], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let upper = stops
        .iter()
        .position(|(pos, _)| *pos >= t)
        .unwrap_or(stops.len() - 1);
    if upper == 0 {
        return stops[0].1;
    }

    let (p0, c0) = stops[upper - 1];
    let (p1, c1) = stops[upper];
    let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 1.0 };

    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
    [mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2])]
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ColormapRepr {
    Name(String),
    Stops(Vec<String>),
}

impl Serialize for Colormap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match &self.name {
            Some(name) => ColormapRepr::Name(name.clone()),
            None => ColormapRepr::Stops(self.stops.iter().map(|(_, c)| rgb_to_hex(*c)).collect()),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Colormap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ColormapRepr::deserialize(deserializer)? {
            ColormapRepr::Name(name) => Colormap::named(&name),
            ColormapRepr::Stops(stops) => Colormap::from_hex_stops(&stops),
        }
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#FF0000"), Some([255, 0, 0]));
        assert_eq!(hex_to_rgb("00ff00"), Some([0, 255, 0]));
        assert_eq!(hex_to_rgb("#GGGGGG"), None);
        assert_eq!(hex_to_rgb("#fff"), None);
    }

    #[test]
    fn test_all_builtins_load() {
        for name in BUILTIN_COLORMAPS {
            let cmap = Colormap::named(name).unwrap();
            assert_eq!(cmap.name(), Some(*name));
        }
        assert!(Colormap::named("jet").is_err());
    }

    #[test]
    fn test_greys_is_identity() {
        let cmap = Colormap::named("greys").unwrap();
        for v in [0u8, 1, 77, 128, 254, 255] {
            assert_eq!(cmap.lookup(v), [v, v, v]);
        }
    }

    #[test]
    fn test_endpoints_match_first_and_last_stop() {
        let cmap = Colormap::named("viridis").unwrap();
        assert_eq!(cmap.lookup(0), [0x44, 0x01, 0x54]);
        assert_eq!(cmap.lookup(255), [0xfd, 0xe7, 0x25]);
    }

    #[test]
    fn test_custom_stops() {
        let cmap = Colormap::from_hex_stops(&["#000000", "#ff0000", "#ffffff"]).unwrap();
        assert_eq!(cmap.name(), None);
        assert_eq!(cmap.lookup(0), [0, 0, 0]);
        assert_eq!(cmap.lookup(255), [255, 255, 255]);
        assert_eq!(cmap.lookup(128)[1], 1);

        assert!(Colormap::from_hex_stops(&["#000000"]).is_err());
        assert!(Colormap::from_hex_stops(&["#000000", "red"]).is_err());
    }

    #[test]
    fn test_serde_name_or_stops() {
        let named: Colormap = serde_json::from_str("\"Terrain\"").unwrap();
        assert_eq!(named.name(), Some("terrain"));

        let custom: Colormap = serde_json::from_str("[\"#000000\", \"#00ff00\"]").unwrap();
        assert_eq!(custom.lookup(255), [0, 255, 0]);
        assert_eq!(
            serde_json::to_string(&custom).unwrap(),
            "[\"#000000\",\"#00ff00\"]"
        );
    }
}
