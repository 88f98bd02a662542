//! Raster containers exchanged between the tile reader and the pipeline.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, CrsCode, GeoTransform, MosaicError, MosaicResult};

/// One scene's read result for the requested region.
///
/// `data` has shape `(bands, height, width)`; `mask` has shape
/// `(height, width)` with `true` marking valid pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterFragment {
    pub scene_id: String,
    pub bands: Vec<String>,
    pub data: Array3<f32>,
    pub mask: Array2<bool>,
    pub bounds: BoundingBox,
    pub crs: CrsCode,
}

impl RasterFragment {
    /// Create a fragment, checking array shapes against each other.
    pub fn new(
        scene_id: impl Into<String>,
        bands: Vec<String>,
        data: Array3<f32>,
        mask: Array2<bool>,
        bounds: BoundingBox,
        crs: CrsCode,
    ) -> MosaicResult<Self> {
        let fragment = Self {
            scene_id: scene_id.into(),
            bands,
            data,
            mask,
            bounds,
            crs,
        };
        fragment.validate()?;
        Ok(fragment)
    }

    /// Check that band names, data and mask agree in shape.
    ///
    /// Deserialized fragments bypass `new`, so readers loading dumps call this.
    pub fn validate(&self) -> MosaicResult<()> {
        let (n_bands, height, width) = self.data.dim();
        if n_bands != self.bands.len() {
            return Err(MosaicError::GridMismatch(format!(
                "fragment {} has {} band names for {} bands",
                self.scene_id,
                self.bands.len(),
                n_bands
            )));
        }
        if self.mask.dim() != (height, width) {
            return Err(MosaicError::GridMismatch(format!(
                "fragment {} mask is {:?}, data is {}x{}",
                self.scene_id,
                self.mask.dim(),
                height,
                width
            )));
        }
        if width == 0 || height == 0 {
            return Err(MosaicError::GridMismatch(format!(
                "fragment {} is empty",
                self.scene_id
            )));
        }
        if !self.bounds.is_valid() {
            return Err(MosaicError::InvalidGeometry(format!(
                "fragment {} has degenerate bounds {:?}",
                self.scene_id, self.bounds
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Affine transform of this fragment's grid.
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_bounds(&self.bounds, self.width(), self.height())
    }

    /// Position of a band by name.
    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == name)
    }

    /// Number of valid pixels.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }

    /// Copy of this fragment holding only `bands`, in that order.
    pub fn select_bands(&self, bands: &[String]) -> MosaicResult<RasterFragment> {
        let indices = bands
            .iter()
            .map(|b| {
                self.band_index(b)
                    .ok_or_else(|| MosaicError::unknown_band(b.as_str(), &self.bands))
            })
            .collect::<MosaicResult<Vec<_>>>()?;
        Ok(RasterFragment {
            scene_id: self.scene_id.clone(),
            bands: bands.to_vec(),
            data: self.data.select(Axis(0), &indices),
            mask: self.mask.clone(),
            bounds: self.bounds,
            crs: self.crs,
        })
    }
}

/// The merged result of several fragments on one grid.
#[derive(Debug, Clone)]
pub struct CompositeRaster {
    data: Array3<f32>,
    mask: Array2<bool>,
    bounds: BoundingBox,
    crs: CrsCode,
    bands: Vec<String>,
    scene_ids: Vec<String>,
    nodata: f32,
}

impl CompositeRaster {
    /// Assemble a composite. Shapes must agree.
    pub fn new(
        data: Array3<f32>,
        mask: Array2<bool>,
        bounds: BoundingBox,
        crs: CrsCode,
        bands: Vec<String>,
        scene_ids: Vec<String>,
        nodata: f32,
    ) -> MosaicResult<Self> {
        let (n_bands, height, width) = data.dim();
        if n_bands != bands.len() || mask.dim() != (height, width) {
            return Err(MosaicError::GridMismatch(format!(
                "composite data {:?} does not match {} bands and mask {:?}",
                data.dim(),
                bands.len(),
                mask.dim()
            )));
        }
        Ok(Self {
            data,
            mask,
            bounds,
            crs,
            bands,
            scene_ids,
            nodata,
        })
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    /// Contributing scene identifiers in merge order.
    pub fn scene_ids(&self) -> &[String] {
        &self.scene_ids
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_bounds(&self.bounds, self.width(), self.height())
    }

    /// View of a single band by name.
    pub fn band(&self, name: &str) -> MosaicResult<ArrayView2<'_, f32>> {
        let index = self
            .bands
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| MosaicError::unknown_band(name, &self.bands))?;
        Ok(self.data.index_axis(Axis(0), index))
    }

    /// Sorted, comma-joined scene identifiers, stable for caching and display.
    pub fn display_name(&self) -> String {
        let mut ids = self.scene_ids.clone();
        ids.sort();
        ids.join(", ")
    }

    /// Number of valid pixels.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fragment_shape_validation() {
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let ok = RasterFragment::new(
            "a",
            names(&["red"]),
            Array3::zeros((1, 2, 3)),
            Array2::from_elem((2, 3), true),
            bounds,
            CrsCode::Epsg4326,
        );
        assert!(ok.is_ok());

        let bad_mask = RasterFragment::new(
            "a",
            names(&["red"]),
            Array3::zeros((1, 2, 3)),
            Array2::from_elem((3, 2), true),
            bounds,
            CrsCode::Epsg4326,
        );
        assert!(matches!(bad_mask, Err(MosaicError::GridMismatch(_))));

        let bad_bands = RasterFragment::new(
            "a",
            names(&["red", "green"]),
            Array3::zeros((1, 2, 3)),
            Array2::from_elem((2, 3), true),
            bounds,
            CrsCode::Epsg4326,
        );
        assert!(bad_bands.is_err());
    }

    #[test]
    fn test_composite_band_lookup_and_name() {
        let composite = CompositeRaster::new(
            Array3::from_elem((2, 1, 1), 5.0),
            Array2::from_elem((1, 1), true),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            CrsCode::Epsg4326,
            names(&["red", "nir"]),
            names(&["S2B_002", "S2A_001"]),
            0.0,
        )
        .unwrap();

        assert_eq!(composite.band("nir").unwrap()[[0, 0]], 5.0);
        assert!(matches!(
            composite.band("swir"),
            Err(MosaicError::UnknownBand { .. })
        ));
        assert_eq!(composite.display_name(), "S2A_001, S2B_002");
        assert_eq!(composite.scene_ids()[0], "S2B_002");
    }
}
