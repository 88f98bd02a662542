//! View evaluation: which bands, or which band math, becomes the image.

use ndarray::{stack, Array2, Array3, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use mosaic_common::{CompositeRaster, MosaicError, MosaicResult};

use crate::expression::{Expression, NonFinitePolicy};

/// What to draw from a composite.
///
/// Serialized externally tagged:
///
/// ```yaml
/// view: { assets: [red, green, blue] }
/// view: { expression: "(nir - red) / (nir + red)" }
/// view:
///   rgb_expression:
///     bands: [red, nir, swir16]
///     formulas: ["swir16", "nir", "red"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewSpec {
    /// Bands shown as they are, one channel each.
    Assets(Vec<String>),
    /// One formula giving a single channel.
    Expression(String),
    /// Three formulas over a band subset, one per RGB channel.
    RgbExpression {
        bands: Vec<String>,
        formulas: [String; 3],
    },
}

impl Default for ViewSpec {
    fn default() -> Self {
        ViewSpec::Assets(vec!["red".into(), "green".into(), "blue".into()])
    }
}

impl ViewSpec {
    /// Number of channels the view produces.
    pub fn channels(&self) -> usize {
        match self {
            ViewSpec::Assets(bands) => bands.len(),
            ViewSpec::Expression(_) => 1,
            ViewSpec::RgbExpression { .. } => 3,
        }
    }

    /// Assets the tile reader must supply, checked without touching rasters.
    ///
    /// Parses every formula, so syntax errors and formulas referring to
    /// bands outside an `RgbExpression` subset fail here.
    pub fn required_bands(&self) -> MosaicResult<Vec<String>> {
        match self {
            ViewSpec::Assets(bands) => {
                check_channel_count(bands.len())?;
                Ok(bands.clone())
            }
            ViewSpec::Expression(formula) => Ok(Expression::parse(formula)?
                .bands()
                .into_iter()
                .map(str::to_string)
                .collect()),
            ViewSpec::RgbExpression { bands, formulas } => {
                for formula in formulas {
                    Expression::parse(formula)?.check_bands(bands)?;
                }
                Ok(bands.clone())
            }
        }
    }
}

fn check_channel_count(n: usize) -> MosaicResult<()> {
    if n == 1 || n == 3 {
        Ok(())
    } else {
        Err(MosaicError::invalid_parameter(
            "view",
            format!("asset views need 1 or 3 bands, got {}", n),
        ))
    }
}

/// Channel data and validity mask of an evaluated view.
#[derive(Debug, Clone)]
pub struct EvaluatedView {
    /// Shape `(channels, height, width)`.
    pub data: Array3<f32>,
    /// Shape `(height, width)`.
    pub mask: Array2<bool>,
}

impl EvaluatedView {
    pub fn channels(&self) -> usize {
        self.data.dim().0
    }
}

/// Evaluate `view` over `composite`.
///
/// Unknown bands fail with `UnknownBand` before any arithmetic runs.
pub fn evaluate(
    composite: &CompositeRaster,
    view: &ViewSpec,
    policy: NonFinitePolicy,
) -> MosaicResult<EvaluatedView> {
    let evaluated = match view {
        ViewSpec::Assets(bands) => {
            check_channel_count(bands.len())?;
            let views = bands
                .iter()
                .map(|b| composite.band(b))
                .collect::<MosaicResult<Vec<_>>>()?;
            EvaluatedView {
                data: stack_channels(&views)?,
                mask: composite.mask().clone(),
            }
        }
        ViewSpec::Expression(formula) => {
            let expression = Expression::parse(formula)?;
            expression.check_bands(composite.bands())?;
            let (values, mask) = evaluate_channel(composite, &expression, policy)?;
            EvaluatedView {
                data: values.insert_axis(Axis(0)),
                mask,
            }
        }
        ViewSpec::RgbExpression { bands, formulas } => {
            let expressions = formulas
                .iter()
                .map(|f| Expression::parse(f))
                .collect::<MosaicResult<Vec<_>>>()?;
            for expression in &expressions {
                expression.check_bands(bands)?;
            }
            if let Some(missing) = bands.iter().find(|b| !composite.bands().contains(*b)) {
                return Err(MosaicError::unknown_band(missing.as_str(), composite.bands()));
            }

            let channels = expressions
                .par_iter()
                .map(|e| evaluate_channel(composite, e, policy))
                .collect::<MosaicResult<Vec<_>>>()?;

            let mut mask = composite.mask().clone();
            for (_, channel_mask) in &channels {
                Zip::from(&mut mask)
                    .and(channel_mask)
                    .for_each(|m, &c| *m = *m && c);
            }
            let views: Vec<_> = channels.iter().map(|(values, _)| values.view()).collect();
            EvaluatedView {
                data: stack_channels(&views)?,
                mask,
            }
        }
    };

    tracing::debug!(
        channels = evaluated.channels(),
        valid = evaluated.mask.iter().filter(|v| **v).count(),
        "Evaluated view"
    );
    Ok(evaluated)
}

fn stack_channels(views: &[ArrayView2<'_, f32>]) -> MosaicResult<Array3<f32>> {
    stack(Axis(0), views)
        .map_err(|e| MosaicError::InternalError(format!("cannot stack channels: {}", e)))
}

/// Evaluate one formula and apply the non-finite policy.
fn evaluate_channel(
    composite: &CompositeRaster,
    expression: &Expression,
    policy: NonFinitePolicy,
) -> MosaicResult<(Array2<f32>, Array2<bool>)> {
    let shape = (composite.height(), composite.width());
    let mut values = expression.evaluate(shape, |name| composite.band(name))?;
    let mut mask = composite.mask().clone();

    let mut replaced = 0usize;
    Zip::from(&mut values).and(&mut mask).for_each(|v, m| {
        if v.is_finite() {
            return;
        }
        replaced += 1;
        match policy {
            NonFinitePolicy::ReplaceWithZero => *v = 0.0,
            NonFinitePolicy::MaskOut => {
                *v = composite.nodata();
                *m = false;
            }
        }
    });

    if replaced > 0 {
        tracing::debug!(
            expression = expression.source(),
            replaced,
            ?policy,
            "Replaced non-finite band math results"
        );
    }
    Ok((values, mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_bands() {
        let view = ViewSpec::Expression("(nir - red) / (nir + red)".into());
        assert_eq!(view.required_bands().unwrap(), vec!["nir", "red"]);
        assert_eq!(view.channels(), 1);

        let rgb = ViewSpec::RgbExpression {
            bands: vec!["red".into(), "nir".into()],
            formulas: ["nir".into(), "red".into(), "swir16".into()],
        };
        assert!(matches!(
            rgb.required_bands(),
            Err(MosaicError::UnknownBand { ref band, .. }) if band == "swir16"
        ));

        let two = ViewSpec::Assets(vec!["red".into(), "nir".into()]);
        assert!(matches!(two.required_bands(), Err(MosaicError::InvalidParameter { .. })));
    }

    #[test]
    fn test_view_serde() {
        let view: ViewSpec = serde_json::from_str(r#"{"assets": ["red", "green", "blue"]}"#).unwrap();
        assert_eq!(view, ViewSpec::default());
        let view: ViewSpec = serde_json::from_str(
            r#"{"rgb_expression": {"bands": ["a"], "formulas": ["a", "a*2", "a/2"]}}"#,
        )
        .unwrap();
        assert_eq!(view.channels(), 3);
    }
}
