//! Fragments dumped to JSON, served as both scene catalog and tile reader.
//!
//! The dump is a JSON array of `{ "scene": ..., "fragment": ... }` objects in
//! priority order. It lets a request be reproduced offline with exactly the
//! rasters a live reader returned.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mosaic_common::{
    Credentials, MosaicError, MosaicResult, RasterFragment, Region, SceneCatalog, SceneDescriptor,
    SceneQuery, TileReader,
};

/// One scene and the raster read for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentDump {
    pub scene: SceneDescriptor,
    pub fragment: RasterFragment,
}

/// Scenes and fragments loaded from a dump file.
#[derive(Debug, Default)]
pub struct LocalStore {
    scenes: Vec<SceneDescriptor>,
    fragments: HashMap<String, RasterFragment>,
}

impl LocalStore {
    /// Build a store, checking each fragment's shape and scene id.
    pub fn from_dumps(dumps: Vec<FragmentDump>) -> MosaicResult<Self> {
        let mut store = Self::default();
        for FragmentDump { scene, fragment } in dumps {
            fragment.validate()?;
            if fragment.scene_id != scene.id {
                return Err(MosaicError::invalid_parameter(
                    "fragments",
                    format!(
                        "fragment for {} is filed under scene {}",
                        fragment.scene_id, scene.id
                    ),
                ));
            }
            if store.fragments.contains_key(&scene.id) {
                return Err(MosaicError::invalid_parameter(
                    "fragments",
                    format!("scene {} appears twice", scene.id),
                ));
            }
            store.fragments.insert(scene.id.clone(), fragment);
            store.scenes.push(scene);
        }
        Ok(store)
    }

    /// Load a dump file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fragments from {}", path.display()))?;
        let dumps: Vec<FragmentDump> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse fragments in {}", path.display()))?;
        let store = Self::from_dumps(dumps)
            .with_context(|| format!("Invalid fragments in {}", path.display()))?;

        info!(
            path = %path.display(),
            scenes = store.scenes.len(),
            "Loaded fragment dump"
        );
        Ok(store)
    }

    /// Every scene, in file order.
    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }
}

impl SceneCatalog for LocalStore {
    fn search(&self, query: &SceneQuery) -> MosaicResult<Vec<SceneDescriptor>> {
        let found: Vec<SceneDescriptor> = self
            .scenes
            .iter()
            .filter(|s| s.datetime.map_or(true, |dt| query.time_range.contains(&dt)))
            .filter(|s| match (query.max_cloud_cover, s.cloud_cover) {
                (Some(max), Some(cc)) => cc <= max,
                _ => true,
            })
            .filter(|s| {
                query.platforms.is_empty()
                    || s.platform
                        .as_ref()
                        .map_or(false, |p| query.platforms.iter().any(|q| q.eq_ignore_ascii_case(p)))
            })
            .take(query.max_items.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        debug!(
            window = %query.time_range.to_date_string(),
            found = found.len(),
            "Searched local scenes"
        );
        Ok(found)
    }
}

impl TileReader for LocalStore {
    fn read(
        &self,
        scene: &SceneDescriptor,
        _region: &Region,
        assets: &[String],
        _credentials: &Credentials,
    ) -> MosaicResult<RasterFragment> {
        self.fragments
            .get(&scene.id)
            .ok_or_else(|| MosaicError::TileRead {
                scene: scene.id.clone(),
                message: "scene is not in the fragment dump".to_string(),
            })?
            .select_bands(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_common::TimeRange;
    use test_utils::{constant_fragment, scene, temp_test_dir, unit_region};

    fn dump(id: &str, day: u32, cloud_cover: f64) -> FragmentDump {
        FragmentDump {
            scene: scene(id, day, cloud_cover),
            fragment: constant_fragment(id, &["red", "green", "blue"], 3, 3, 100.0),
        }
    }

    fn query(window: &str) -> SceneQuery {
        SceneQuery {
            region: unit_region().geometry().clone(),
            time_range: TimeRange::parse(window).unwrap(),
            collection: "sentinel-2-l2a".to_string(),
            max_cloud_cover: None,
            platforms: Vec::new(),
            max_items: None,
        }
    }

    #[test]
    fn test_search_filters() {
        let store =
            LocalStore::from_dumps(vec![dump("A", 2, 5.0), dump("B", 3, 60.0), dump("C", 20, 1.0)])
                .unwrap();

        let ids = |q: &SceneQuery| -> Vec<String> {
            store.search(q).unwrap().into_iter().map(|s| s.id).collect()
        };

        assert_eq!(ids(&query("2024-01-01/2024-01-10")), vec!["A", "B"]);

        let mut cloudy = query("2024-01-01/2024-01-31");
        cloudy.max_cloud_cover = Some(20.0);
        assert_eq!(ids(&cloudy), vec!["A", "C"]);

        let mut limited = query("2024-01-01/2024-01-31");
        limited.max_items = Some(1);
        assert_eq!(ids(&limited), vec!["A"]);

        let mut landsat = query("2024-01-01/2024-01-31");
        landsat.platforms = vec!["landsat-8".to_string()];
        assert!(ids(&landsat).is_empty());
    }

    #[test]
    fn test_mismatched_scene_id_rejected() {
        let mut bad = dump("A", 2, 5.0);
        bad.fragment.scene_id = "B".to_string();
        assert!(LocalStore::from_dumps(vec![bad]).is_err());
        assert!(LocalStore::from_dumps(vec![dump("A", 2, 5.0), dump("A", 3, 5.0)]).is_err());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = temp_test_dir();
        let path = dir.path().join("fragments.json");
        std::fs::write(&path, serde_json::to_string(&vec![dump("A", 2, 5.0)]).unwrap()).unwrap();

        let store = LocalStore::load(&path).unwrap();
        assert_eq!(store.scenes().len(), 1);

        let fragment = store
            .read(
                &store.scenes()[0],
                &unit_region(),
                &["blue".to_string()],
                &Credentials::anonymous(),
            )
            .unwrap();
        assert_eq!(fragment.data.dim(), (1, 3, 3));
        assert_eq!(fragment.data[[0, 1, 1]], 100.0);
    }

    #[test]
    fn test_load_reports_path() {
        let err = LocalStore::load(Path::new("/nonexistent/fragments.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/fragments.json"));
    }
}
