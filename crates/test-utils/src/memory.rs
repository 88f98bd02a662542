//! In-memory catalog and tile reader for driving the pipeline in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use mosaic_common::{
    Credentials, MosaicError, MosaicResult, RasterFragment, Region, SceneCatalog, SceneDescriptor,
    SceneQuery, TileReader,
};

/// Catalog returning its scenes, in insertion order, filtered by time window.
///
/// Scenes without a datetime match every window.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    scenes: Vec<SceneDescriptor>,
}

impl MemoryCatalog {
    pub fn new(scenes: Vec<SceneDescriptor>) -> Self {
        Self { scenes }
    }
}

impl SceneCatalog for MemoryCatalog {
    fn search(&self, query: &SceneQuery) -> MosaicResult<Vec<SceneDescriptor>> {
        let found = self
            .scenes
            .iter()
            .filter(|s| s.datetime.map_or(true, |dt| query.time_range.contains(&dt)))
            .take(query.max_items.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(found)
    }
}

/// Reader serving prepared fragments by scene id.
///
/// Counts every read and remembers the `AWS_ACCESS_KEY_ID` seen in the
/// environment during each one.
#[derive(Debug, Default)]
pub struct MemoryReader {
    fragments: HashMap<String, RasterFragment>,
    reads: AtomicUsize,
    seen_access_keys: Mutex<Vec<Option<String>>>,
}

impl MemoryReader {
    pub fn new(fragments: impl IntoIterator<Item = RasterFragment>) -> Self {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| (f.scene_id.clone(), f))
                .collect(),
            ..Self::default()
        }
    }

    /// Number of reads served so far, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Access key present in the environment at each read.
    pub fn seen_access_keys(&self) -> Vec<Option<String>> {
        self.seen_access_keys
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }
}

impl TileReader for MemoryReader {
    fn read(
        &self,
        scene: &SceneDescriptor,
        _region: &Region,
        assets: &[String],
        _credentials: &Credentials,
    ) -> MosaicResult<RasterFragment> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut keys) = self.seen_access_keys.lock() {
            keys.push(std::env::var("AWS_ACCESS_KEY_ID").ok());
        }

        let fragment = self.fragments.get(&scene.id).ok_or_else(|| MosaicError::TileRead {
            scene: scene.id.clone(),
            message: "no fragment prepared".to_string(),
        })?;
        fragment.select_bands(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant_fragment, scene, unit_region};
    use mosaic_common::TimeRange;

    #[test]
    fn test_catalog_filters_by_window() {
        let catalog = MemoryCatalog::new(vec![scene("A", 2, 1.0), scene("B", 20, 1.0)]);
        let query = SceneQuery {
            region: unit_region().geometry().clone(),
            time_range: TimeRange::parse("2024-01-01/2024-01-10").unwrap(),
            collection: "sentinel-2-l2a".to_string(),
            max_cloud_cover: None,
            platforms: Vec::new(),
            max_items: None,
        };
        let found = catalog.search(&query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "A");
    }

    #[test]
    fn test_reader_selects_bands() {
        let reader = MemoryReader::new(vec![constant_fragment("A", &["red", "nir"], 2, 2, 3.0)]);
        let fragment = reader
            .read(
                &scene("A", 1, 0.0),
                &unit_region(),
                &["nir".to_string()],
                &Credentials::anonymous(),
            )
            .unwrap();
        assert_eq!(fragment.bands, vec!["nir".to_string()]);
        assert_eq!(fragment.data.dim(), (1, 2, 2));

        assert!(reader
            .read(&scene("B", 1, 0.0), &unit_region(), &[], &Credentials::anonymous())
            .is_err());
        assert_eq!(reader.reads(), 2);
    }
}
