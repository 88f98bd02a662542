//! Request pipeline: catalog search to delivery bundle.

use rayon::prelude::*;

use mosaic_common::{
    CredentialScope, ErrorKind, MosaicError, MosaicResult, RasterFragment, SceneCatalog,
    SceneDescriptor, TileReader, TimeRange,
};
use renderer::render;

use crate::composite::CompositeBuilder;
use crate::config::{PipelineConfig, RenderPlan, RenderRequest};
use crate::contours;
use crate::enhance::{Enhancer, Upsampler};
use crate::georef::georeference;
use crate::package::{package, DeliveryBundle};
use crate::view::evaluate;

/// One rendered time window of an animation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub time_range: TimeRange,
    pub bundle: DeliveryBundle,
}

/// Runs render requests against a scene catalog and a tile reader.
pub struct Pipeline<C, R> {
    catalog: C,
    reader: R,
    config: PipelineConfig,
    enhancer: Enhancer,
}

impl<C, R> Pipeline<C, R>
where
    C: SceneCatalog,
    R: TileReader + Sync,
{
    /// Create a pipeline with the built-in interpolating upsampler.
    pub fn new(catalog: C, reader: R, config: PipelineConfig) -> MosaicResult<Self> {
        config.validate()?;
        let enhancer = Enhancer::default().with_jpeg_quality(config.jpeg_quality);
        Ok(Self {
            catalog,
            reader,
            config,
            enhancer,
        })
    }

    /// Replace the super-resolution capability used for enhancement.
    pub fn with_upsampler(mut self, upsampler: Box<dyn Upsampler>) -> Self {
        self.enhancer = Enhancer::new(upsampler).with_jpeg_quality(self.config.jpeg_quality);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Search the catalog over the request's time window and render the result.
    pub fn run(&self, request: &RenderRequest) -> MosaicResult<DeliveryBundle> {
        let plan = request.plan(&self.config)?;
        let time_range = request.time_range()?;
        self.run_window(request, &plan, time_range)
    }

    /// Render already selected scenes, in priority order, without a catalog search.
    pub fn render_scenes(
        &self,
        request: &RenderRequest,
        scenes: &[SceneDescriptor],
    ) -> MosaicResult<DeliveryBundle> {
        let plan = request.plan(&self.config)?;
        self.render_planned(request, &plan, scenes)
    }

    /// Render one frame per `frame_days` sub-window of the request's time range.
    ///
    /// Windows without usable scenes are skipped. Fails with `EmptyInput`
    /// when no frame could be rendered.
    pub fn render_frames(&self, request: &RenderRequest, frame_days: i64) -> MosaicResult<Vec<Frame>> {
        let plan = request.plan(&self.config)?;
        let windows = request.time_range()?.subdivide(frame_days);

        let mut frames = Vec::with_capacity(windows.len());
        for window in windows {
            match self.run_window(request, &plan, window) {
                Ok(bundle) => frames.push(Frame {
                    time_range: window,
                    bundle,
                }),
                Err(e) if e.kind() == ErrorKind::EmptyResult => {
                    tracing::warn!(
                        window = %window.to_date_string(),
                        error = %e,
                        "Skipping empty animation frame"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if frames.is_empty() {
            return Err(MosaicError::EmptyInput(
                "no time window produced a frame".to_string(),
            ));
        }
        tracing::info!(frames = frames.len(), frame_days, "Rendered animation frames");
        Ok(frames)
    }

    fn run_window(
        &self,
        request: &RenderRequest,
        plan: &RenderPlan,
        time_range: TimeRange,
    ) -> MosaicResult<DeliveryBundle> {
        let scenes = self.catalog.search(&request.scene_query(time_range))?;
        tracing::info!(
            window = %time_range.to_date_string(),
            scenes = scenes.len(),
            "Catalog search finished"
        );
        self.render_planned(request, plan, &scenes)
    }

    fn render_planned(
        &self,
        request: &RenderRequest,
        plan: &RenderPlan,
        scenes: &[SceneDescriptor],
    ) -> MosaicResult<DeliveryBundle> {
        if scenes.is_empty() {
            return Err(MosaicError::EmptyInput("no scenes to composite".to_string()));
        }
        let usable: Vec<&SceneDescriptor> = scenes
            .iter()
            .filter(|scene| {
                let ok = scene.has_assets(&plan.assets);
                if !ok {
                    tracing::warn!(scene = %scene.id, "Skipping scene without the requested assets");
                }
                ok
            })
            .collect();
        if usable.is_empty() {
            return Err(MosaicError::EmptyInput(format!(
                "no scene provides assets {}",
                plan.assets.join(", ")
            )));
        }

        let fragments = self.read_fragments(request, plan, &usable)?;
        let composite = CompositeBuilder::new()
            .with_nodata(self.config.nodata)
            .build(&fragments, &plan.region)?;

        let view = evaluate(&composite, &request.view, self.config.non_finite)?;
        let output = render(
            view.data.view(),
            view.mask.view(),
            plan.range,
            &plan.treatment,
            request.auto_range,
            plan.format,
            &self.config.render_options(),
        )?;
        let image = self.enhancer.enhance(&output.image, request.enhance.passes())?;

        let georef = georeference(composite.bounds(), composite.crs(), image.width, image.height)?;
        let contour_set = request
            .contours
            .as_ref()
            .map(|c| contours::extract(&composite, c, &plan.region, &self.config))
            .transpose()?;

        let contributing: Vec<SceneDescriptor> = composite
            .scene_ids()
            .iter()
            .filter_map(|id| usable.iter().find(|s| &s.id == id).map(|s| (*s).clone()))
            .collect();

        package(
            image,
            georef,
            &plan.region,
            &contributing,
            contour_set,
            output.range,
            request.archive,
        )
    }

    /// Read every scene in parallel, keeping priority order.
    fn read_fragments(
        &self,
        request: &RenderRequest,
        plan: &RenderPlan,
        scenes: &[&SceneDescriptor],
    ) -> MosaicResult<Vec<RasterFragment>> {
        let _scope = request
            .env_credentials
            .then(|| CredentialScope::for_credentials(&request.credentials));

        let reader = &self.reader;
        let fragments = scenes
            .par_iter()
            .map(|scene| reader.read(scene, &plan.region, &plan.assets, &request.credentials))
            .collect::<MosaicResult<Vec<_>>>()?;

        tracing::debug!(fragments = fragments.len(), "Read fragments");
        Ok(fragments)
    }
}
