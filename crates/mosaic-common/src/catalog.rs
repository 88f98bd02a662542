//! Interfaces to the collaborators that find and read scenes.
//!
//! The pipeline never searches catalogs or decodes imagery itself; it talks
//! to these traits. Both are expected to be pure from the pipeline's point
//! of view: the same inputs give the same outputs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geojson::{Feature, Geometry};
use crate::{BoundingBox, MosaicResult, RasterFragment, Region, TimeRange};

/// One scene as returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub id: String,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    /// Cloud/quality score in percent, lower is better.
    #[serde(default)]
    pub cloud_cover: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Footprint in EPSG:4326.
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    /// Asset identifier to asset reference (usually a URL).
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

impl SceneDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            datetime: None,
            cloud_cover: None,
            platform: None,
            collection: None,
            bbox: None,
            assets: BTreeMap::new(),
        }
    }

    /// Check that every requested asset is available on this scene.
    pub fn has_assets(&self, assets: &[String]) -> bool {
        assets.iter().all(|a| self.assets.contains_key(a))
    }

    /// Metadata feature listed in the delivery bundle.
    pub fn to_feature(&self) -> Feature {
        let mut properties = Map::new();
        if let Some(dt) = self.datetime {
            properties.insert("datetime".into(), Value::from(dt.to_rfc3339()));
        }
        if let Some(cc) = self.cloud_cover {
            properties.insert("eo:cloud_cover".into(), Value::from(cc));
        }
        if let Some(platform) = &self.platform {
            properties.insert("platform".into(), Value::from(platform.as_str()));
        }
        if let Some(collection) = &self.collection {
            properties.insert("collection".into(), Value::from(collection.as_str()));
        }

        Feature {
            type_: "Feature".to_string(),
            id: Some(self.id.clone()),
            geometry: self.bbox.as_ref().map(Geometry::from_bbox),
            properties,
        }
    }
}

/// Search parameters handed to a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneQuery {
    pub region: Geometry,
    pub time_range: TimeRange,
    pub collection: String,
    #[serde(default)]
    pub max_cloud_cover: Option<f64>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub max_items: Option<usize>,
}

/// Access credentials for the storage behind a tile reader.
///
/// Passed explicitly to every read. `Debug` never prints secrets.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    /// Who pays for requester-pays buckets ("provider" or "requester").
    #[serde(default)]
    pub request_payer: Option<String>,
    /// Issue unsigned requests (public buckets).
    #[serde(default)]
    pub no_sign_request: bool,
}

impl Credentials {
    /// Credentials for public, unsigned access.
    pub fn anonymous() -> Self {
        Self {
            no_sign_request: true,
            ..Self::default()
        }
    }

    /// Environment variables a backend reading ambient configuration expects.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (
                "AWS_ACCESS_KEY_ID".to_string(),
                self.access_key_id.clone().unwrap_or_default(),
            ),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                self.secret_access_key.clone().unwrap_or_default(),
            ),
            (
                "AWS_NO_SIGN_REQUEST".to_string(),
                if self.no_sign_request { "YES" } else { "NO" }.to_string(),
            ),
            (
                "AWS_REQUEST_PAYER".to_string(),
                self.request_payer
                    .clone()
                    .unwrap_or_else(|| "provider".to_string()),
            ),
        ];
        if let Some(region) = &self.region_name {
            vars.push(("AWS_REGION".to_string(), region.clone()));
        }
        vars
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "***"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("region_name", &self.region_name)
            .field("request_payer", &self.request_payer)
            .field("no_sign_request", &self.no_sign_request)
            .finish()
    }
}

/// Finds scenes intersecting a region within a time window.
pub trait SceneCatalog {
    /// Scenes in priority order (first is preferred when compositing).
    fn search(&self, query: &SceneQuery) -> MosaicResult<Vec<SceneDescriptor>>;
}

/// Reads the portion of one scene covering a region.
pub trait TileReader {
    fn read(
        &self,
        scene: &SceneDescriptor,
        region: &Region,
        assets: &[String],
        credentials: &Credentials,
    ) -> MosaicResult<RasterFragment>;
}

impl<T: SceneCatalog + ?Sized> SceneCatalog for &T {
    fn search(&self, query: &SceneQuery) -> MosaicResult<Vec<SceneDescriptor>> {
        (**self).search(query)
    }
}

impl<T: TileReader + ?Sized> TileReader for &T {
    fn read(
        &self,
        scene: &SceneDescriptor,
        region: &Region,
        assets: &[String],
        credentials: &Credentials,
    ) -> MosaicResult<RasterFragment> {
        (**self).read(scene, region, assets, credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials {
            access_key_id: Some("AKIAEXAMPLE".into()),
            secret_access_key: Some("very-secret".into()),
            ..Credentials::default()
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("AKIAEXAMPLE"));
    }

    #[test]
    fn test_env_vars_anonymous() {
        let vars = Credentials::anonymous().env_vars();
        assert!(vars.contains(&("AWS_NO_SIGN_REQUEST".to_string(), "YES".to_string())));
        assert!(vars.contains(&("AWS_REQUEST_PAYER".to_string(), "provider".to_string())));
        assert!(!vars.iter().any(|(k, _)| k == "AWS_REGION"));
    }

    #[test]
    fn test_scene_feature() {
        let mut scene = SceneDescriptor::new("S2A_T33_20240101");
        scene.cloud_cover = Some(12.5);
        scene.bbox = Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        scene.assets.insert("red".into(), "s3://bucket/red.tif".into());

        assert!(scene.has_assets(&["red".to_string()]));
        assert!(!scene.has_assets(&["red".to_string(), "nir".to_string()]));

        let feature = scene.to_feature();
        assert_eq!(feature.id.as_deref(), Some("S2A_T33_20240101"));
        assert_eq!(feature.number_property("eo:cloud_cover"), Some(12.5));
        assert!(feature.geometry.is_some());
    }
}
