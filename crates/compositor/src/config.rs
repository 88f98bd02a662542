//! Pipeline configuration and render requests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mosaic_common::{
    Credentials, Geometry, MosaicError, MosaicResult, Region, SceneQuery, TimeRange,
};
use projection::WebMercator;
use renderer::range::DEFAULT_RANGE_PRECISION;
use renderer::contour::{DEFAULT_MAX_PEAKS, DEFAULT_PEAK_WINDOW};
use renderer::{ColorFormula, ColorTreatment, ContourParams, ImageFormat, RenderOptions, ValueRange};

use crate::composite::DEFAULT_NODATA;
use crate::enhance::EnhanceFactor;
use crate::expression::NonFinitePolicy;
use crate::view::ViewSpec;

/// Default largest region accepted, in hectares.
pub const DEFAULT_MAX_AREA_HECTARES: u64 = 100_000;

/// Collection searched when a request names none.
pub const DEFAULT_COLLECTION: &str = "sentinel-2-l2a";

/// Settings shared by every request a pipeline serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sentinel written to uncovered pixels and excluded from auto ranges.
    pub nodata: f32,

    /// Decimal places kept in automatic value ranges.
    pub range_precision: u32,

    /// Side of the sliding window used to find peaks, in pixels.
    pub peak_window: usize,

    /// Number of peaks reported.
    pub max_peaks: usize,

    /// JPEG quality (1-100).
    pub jpeg_quality: u8,

    /// Handling of NaN and infinite band-math results.
    pub non_finite: NonFinitePolicy,

    /// Largest region accepted, in hectares.
    pub max_area_hectares: u64,

    /// Treatment for three-channel views when the request names none.
    pub color_formula: ColorFormula,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nodata: DEFAULT_NODATA,
            range_precision: DEFAULT_RANGE_PRECISION,
            peak_window: DEFAULT_PEAK_WINDOW,
            max_peaks: DEFAULT_MAX_PEAKS,
            jpeg_quality: 85,
            non_finite: NonFinitePolicy::default(),
            max_area_hectares: DEFAULT_MAX_AREA_HECTARES,
            color_formula: ColorFormula::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source, starting from defaults.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
                    None
                }
            }
        }

        let mut config = Self::default();

        if let Some(v) = parsed("MOSAIC_NODATA", lookup("MOSAIC_NODATA")) {
            config.nodata = v;
        }
        if let Some(v) = parsed("MOSAIC_RANGE_PRECISION", lookup("MOSAIC_RANGE_PRECISION")) {
            config.range_precision = v;
        }
        if let Some(v) = parsed("MOSAIC_PEAK_WINDOW", lookup("MOSAIC_PEAK_WINDOW")) {
            config.peak_window = v;
        }
        if let Some(v) = parsed("MOSAIC_MAX_PEAKS", lookup("MOSAIC_MAX_PEAKS")) {
            config.max_peaks = v;
        }
        if let Some(v) = parsed("MOSAIC_JPEG_QUALITY", lookup("MOSAIC_JPEG_QUALITY")) {
            config.jpeg_quality = v;
        }
        if let Some(v) = parsed("MOSAIC_NONFINITE_POLICY", lookup("MOSAIC_NONFINITE_POLICY")) {
            config.non_finite = v;
        }
        if let Some(v) = parsed("MAX_AREA_HECTARES", lookup("MAX_AREA_HECTARES")) {
            config.max_area_hectares = v;
        }
        if let Some(v) = parsed("MOSAIC_COLOR_FORMULA", lookup("MOSAIC_COLOR_FORMULA")) {
            config.color_formula = v;
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> MosaicResult<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(MosaicError::invalid_parameter(
                "jpeg_quality",
                format!("must be 1-100, got {}", self.jpeg_quality),
            ));
        }
        if self.peak_window == 0 {
            return Err(MosaicError::invalid_parameter("peak_window", "must be > 0"));
        }
        if self.range_precision > 15 {
            return Err(MosaicError::invalid_parameter(
                "range_precision",
                format!("at most 15 decimal places, got {}", self.range_precision),
            ));
        }
        if self.max_area_hectares == 0 {
            return Err(MosaicError::invalid_parameter("max_area_hectares", "must be > 0"));
        }
        Ok(())
    }

    /// Renderer settings derived from this configuration.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            nodata: self.nodata,
            range_precision: self.range_precision,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

/// Optional contouring of one composite band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourRequest {
    #[serde(flatten)]
    pub params: ContourParams,
    /// Band holding elevations; the composite's first band when absent.
    #[serde(default)]
    pub band: Option<String>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_format() -> String {
    "PNG".to_string()
}

/// Everything one render needs, as loaded from YAML or JSON.
///
/// ```yaml
/// region:
///   type: Polygon
///   coordinates: [[[0.60, 41.60], [0.62, 41.60], [0.62, 41.615], [0.60, 41.60]]]
/// time_range: 2024-01-01/2024-03-31
/// max_cloud_cover: 20
/// view: { assets: [red, green, blue] }
/// enhance: 4x
/// format: PNG
/// archive: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Area of interest in EPSG:4326.
    pub region: Geometry,

    /// `start/end` acquisition window for catalog searches.
    #[serde(default)]
    pub time_range: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub max_cloud_cover: Option<f64>,

    #[serde(default)]
    pub platforms: Vec<String>,

    #[serde(default)]
    pub max_items: Option<usize>,

    #[serde(default)]
    pub view: ViewSpec,

    /// Color formula or colormap; chosen from the channel count when absent.
    #[serde(default)]
    pub treatment: Option<ColorTreatment>,

    /// Input range mapped onto 0-255; `[0, 4000]` when absent.
    #[serde(default)]
    pub range: Option<ValueRange>,

    /// Replace the range with the min/max of valid pixels.
    #[serde(default)]
    pub auto_range: bool,

    #[serde(default)]
    pub enhance: EnhanceFactor,

    #[serde(default)]
    pub contours: Option<ContourRequest>,

    /// Output format name, checked before any raster work.
    #[serde(default = "default_format")]
    pub format: String,

    /// Return a zip archive instead of loose artifacts.
    #[serde(default)]
    pub archive: bool,

    #[serde(default)]
    pub credentials: Credentials,

    /// Export credentials as environment variables while reading tiles.
    #[serde(default)]
    pub env_credentials: bool,
}

/// Request settings resolved and checked before any raster work.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub format: ImageFormat,
    pub region: Region,
    /// Planar Web Mercator area of the region, checked against the size limit.
    pub area_ha: f64,
    /// View bands plus the contour band, in read order.
    pub assets: Vec<String>,
    pub treatment: ColorTreatment,
    pub range: ValueRange,
}

impl RenderRequest {
    /// A request for `region` with every other field at its default.
    pub fn new(region: Geometry) -> Self {
        Self {
            region,
            time_range: None,
            collection: default_collection(),
            max_cloud_cover: None,
            platforms: Vec::new(),
            max_items: None,
            view: ViewSpec::default(),
            treatment: None,
            range: None,
            auto_range: false,
            enhance: EnhanceFactor::default(),
            contours: None,
            format: default_format(),
            archive: false,
            credentials: Credentials::default(),
            env_credentials: false,
        }
    }

    /// Parse a YAML request. Enum fields use the `{ variant: value }` map form.
    pub fn from_yaml_str(s: &str) -> MosaicResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(s);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
            .map_err(|e| MosaicError::invalid_parameter("request", e.to_string()))
    }

    pub fn from_json_str(s: &str) -> MosaicResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| MosaicError::invalid_parameter("request", e.to_string()))
    }

    /// Load a request file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> MosaicResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn format(&self) -> MosaicResult<ImageFormat> {
        ImageFormat::parse(&self.format)
    }

    pub fn region(&self) -> MosaicResult<Region> {
        Region::from_geometry(self.region.clone())
    }

    pub fn time_range(&self) -> MosaicResult<TimeRange> {
        let raw = self.time_range.as_deref().ok_or_else(|| {
            MosaicError::invalid_parameter("time_range", "required to search the catalog")
        })?;
        TimeRange::parse(raw).map_err(|e| MosaicError::invalid_parameter("time_range", e.to_string()))
    }

    /// The value range to apply before any automatic adjustment.
    pub fn value_range(&self) -> ValueRange {
        self.range.unwrap_or_default()
    }

    /// The requested treatment, or the default for the view's channel count.
    pub fn treatment(&self, config: &PipelineConfig) -> MosaicResult<ColorTreatment> {
        match &self.treatment {
            Some(treatment) => Ok(treatment.clone()),
            None if self.view.channels() == 3 => {
                Ok(ColorTreatment::ColorFormula(config.color_formula.clone()))
            }
            None => ColorTreatment::default_for_channels(self.view.channels()),
        }
    }

    /// Resolve and check everything that can fail without reading tiles.
    ///
    /// Covers the output format, the region and its area limit, the view's
    /// bands and formulas, the treatment against the view's channel count
    /// and the contour parameters.
    pub fn plan(&self, config: &PipelineConfig) -> MosaicResult<RenderPlan> {
        let format = self.format()?;

        let region = self.region()?;
        let area_ha = region.projected_area_hectares(|lon, lat| WebMercator.forward(lon, lat));
        if area_ha > config.max_area_hectares as f64 {
            return Err(MosaicError::RegionTooLarge {
                area_ha,
                max_ha: config.max_area_hectares,
            });
        }

        let mut assets = self.view.required_bands()?;
        let treatment = self.treatment(config)?;
        match (self.view.channels(), &treatment) {
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
            _ => {}
        }

        if let Some(contour_request) = &self.contours {
            contour_request.params.validate()?;
            if let Some(band) = &contour_request.band {
                if !assets.contains(band) {
                    assets.push(band.clone());
                }
            }
        }

        tracing::debug!(
            format = %format,
            area_ha,
            assets = %assets.join(","),
            "Planned render request"
        );

        Ok(RenderPlan {
            format,
            region,
            area_ha,
            assets,
            treatment,
            range: self.value_range(),
        })
    }

    /// Catalog query for `time_range` (the request's own window, or a frame of it).
    pub fn scene_query(&self, time_range: TimeRange) -> SceneQuery {
        SceneQuery {
            region: self.region.clone(),
            time_range,
            collection: self.collection.clone(),
            max_cloud_cover: self.max_cloud_cover,
            platforms: self.platforms.clone(),
            max_items: self.max_items,
        }
    }
}
