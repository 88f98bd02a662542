//! Delivery bundles and their zip archives.
//!
//! A bundle holds the artifacts a GIS user needs to place the image:
//!
//! | Entry                    | Content                                   |
//! |--------------------------|-------------------------------------------|
//! | `image.png` / `.jpeg`    | rendered image                            |
//! | `image.pgw` / `.jgw`     | world file                                |
//! | `polygon.geojson`        | requested region as a Feature             |
//! | `image_metadata.geojson` | one Feature per contributing scene        |
//! | `contours.geojson`       | contour lines and peaks, when requested   |

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use mosaic_common::{Feature, FeatureCollection, MosaicResult, Region, SceneDescriptor};
use renderer::{ContourSet, RenderedImage, ValueRange};

use crate::georef::GeoReference;

/// Everything produced for one request.
#[derive(Debug, Clone)]
pub struct DeliveryBundle {
    /// Sorted, comma-joined identifiers of the contributing scenes.
    pub name: String,
    pub image: RenderedImage,
    pub georeference: GeoReference,
    pub world_file: String,
    /// The requested region wrapped in a Feature.
    pub region: Feature,
    /// Metadata of the contributing scenes, in merge order.
    pub scenes: FeatureCollection,
    pub contours: Option<ContourSet>,
    /// Value range applied while rendering.
    pub value_range: ValueRange,
    /// Zip archive of [`DeliveryBundle::entries`], when requested.
    pub archive: Option<Vec<u8>>,
}

/// Assemble a bundle, optionally building its archive.
pub fn package(
    image: RenderedImage,
    georeference: GeoReference,
    region: &Region,
    scenes: &[SceneDescriptor],
    contours: Option<ContourSet>,
    value_range: ValueRange,
    archive: bool,
) -> MosaicResult<DeliveryBundle> {
    let mut ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();

    let mut bundle = DeliveryBundle {
        name: ids.join(", "),
        world_file: georeference.world_file(),
        image,
        georeference,
        region: Feature::new(region.geometry().clone()),
        scenes: FeatureCollection::new().with_features(scenes.iter().map(|s| s.to_feature())),
        contours,
        value_range,
        archive: None,
    };

    if archive {
        bundle.archive = Some(bundle.to_archive()?);
    }

    tracing::info!(
        name = %bundle.name,
        format = %bundle.image.format,
        width = bundle.image.width,
        height = bundle.image.height,
        archive_bytes = bundle.archive.as_ref().map_or(0, Vec::len),
        "Packaged delivery bundle"
    );
    Ok(bundle)
}

impl DeliveryBundle {
    /// File name and content of every artifact, in archive order.
    pub fn entries(&self) -> MosaicResult<Vec<(String, Vec<u8>)>> {
        let format = self.image.format;
        let mut entries = vec![
            (format!("image.{}", format.extension()), self.image.bytes.clone()),
            (
                format!("image.{}", format.world_file_extension()),
                self.world_file.clone().into_bytes(),
            ),
            ("polygon.geojson".to_string(), serde_json::to_vec(&self.region)?),
            ("image_metadata.geojson".to_string(), serde_json::to_vec(&self.scenes)?),
        ];
        if let Some(contours) = &self.contours {
            entries.push((
                "contours.geojson".to_string(),
                serde_json::to_vec(&contours.to_feature_collection())?,
            ));
        }
        Ok(entries)
    }

    /// Deflated zip archive of the entries.
    ///
    /// Entry timestamps are fixed, so equal bundles give equal bytes.
    pub fn to_archive(&self) -> MosaicResult<Vec<u8>> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in self.entries()? {
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Write the entries as loose files into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> MosaicResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        self.entries()?
            .into_iter()
            .map(|(name, bytes)| {
                let path = dir.join(name);
                std::fs::write(&path, bytes)?;
                Ok(path)
            })
            .collect()
    }
}
