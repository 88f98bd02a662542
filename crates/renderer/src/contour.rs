//! Quantized elevation contours and peaks as GeoJSON.
//!
//! The surface is binned into steps of `gap`, iso-lines between adjacent
//! steps are traced with marching squares, smoothed, moved to geographic
//! coordinates and clipped to the request region. The highest local maxima
//! are reported as points. Every feature carries the quantized level in its
//! `pixel_value` property, never the raw surface value.

use std::collections::{HashMap, VecDeque};

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use mosaic_common::geojson::{Feature, FeatureCollection, Geometry};
use mosaic_common::{CrsCode, GeoTransform, MosaicError, MosaicResult, Region};

/// Side of the square window used to find local maxima, in pixels.
pub const DEFAULT_PEAK_WINDOW: usize = 50;

/// Number of peaks reported.
pub const DEFAULT_MAX_PEAKS: usize = 5;

/// A point in pixel space, `x` along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn key(&self) -> (i64, i64) {
        (
            (self.x as f64 * 1e4).round() as i64,
            (self.y as f64 * 1e4).round() as i64,
        )
    }
}

/// A line segment between two points
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

/// A traced iso-line in pixel space.
#[derive(Debug, Clone)]
pub struct Contour {
    pub level: f32,
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Caller-supplied contour settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourParams {
    /// Elevation step between contour levels.
    pub gap: f64,
    /// Traced lines with fewer points are dropped.
    #[serde(default = "default_min_vertices")]
    pub min_vertices: usize,
    /// Gaussian sigma, in vertices, applied along each line.
    #[serde(default = "default_smoothing_sigma")]
    pub smoothing_sigma: f64,
}

fn default_min_vertices() -> usize {
    10
}

fn default_smoothing_sigma() -> f64 {
    1.0
}

impl ContourParams {
    pub fn new(gap: f64, min_vertices: usize, smoothing_sigma: f64) -> MosaicResult<Self> {
        let params = Self {
            gap,
            min_vertices,
            smoothing_sigma,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> MosaicResult<()> {
        if !self.gap.is_finite() || self.gap <= 0.0 {
            return Err(MosaicError::invalid_parameter(
                "gap",
                format!("must be a positive number, got {}", self.gap),
            ));
        }
        if !self.smoothing_sigma.is_finite() || self.smoothing_sigma < 0.0 {
            return Err(MosaicError::invalid_parameter(
                "smoothing_sigma",
                format!("must not be negative, got {}", self.smoothing_sigma),
            ));
        }
        Ok(())
    }
}

/// One clipped contour line.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLine {
    pub level: f64,
    pub geometry: Geometry,
}

/// A ranked local maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub lon: f64,
    pub lat: f64,
    pub level: f64,
}

/// Contour lines plus ranked peaks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourSet {
    pub lines: Vec<ContourLine>,
    pub peaks: Vec<Peak>,
}

impl ContourSet {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.peaks.is_empty()
    }

    /// Lines first, then peaks in rank order.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let lines = self.lines.iter().map(|line| {
            Feature::new(line.geometry.clone())
                .with_property("kind", "contour")
                .with_property("pixel_value", line.level)
        });
        let peaks = self.peaks.iter().enumerate().map(|(rank, peak)| {
            Feature::new(Geometry::point(peak.lon, peak.lat))
                .with_property("kind", "peak")
                .with_property("rank", rank as u64 + 1)
                .with_property("pixel_value", peak.level)
        });
        FeatureCollection::new().with_features(lines.chain(peaks))
    }
}

/// Bin `value` into steps of `gap`: `floor((v + gap) / gap) * gap - gap`.
#[inline]
pub fn quantize(value: f64, gap: f64) -> f64 {
    ((value + gap) / gap).floor() * gap - gap
}

/// Quantize a surface. Masked, no-data and non-finite pixels become NaN.
pub fn quantize_grid(
    values: ArrayView2<'_, f32>,
    mask: ArrayView2<'_, bool>,
    nodata: f32,
    gap: f64,
) -> Array2<f32> {
    let mut out = Array2::from_elem(values.dim(), f32::NAN);
    ndarray::Zip::from(&mut out)
        .and(&values)
        .and(&mask)
        .for_each(|q, &v, &valid| {
            if valid && v != nodata && v.is_finite() {
                *q = quantize(v as f64, gap) as f32;
            }
        });
    out
}

/// Distinct non-NaN values of a quantized grid, ascending.
pub fn distinct_levels(grid: &Array2<f32>) -> Vec<f64> {
    let mut levels: Vec<f64> = grid
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| v as f64)
        .collect();
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup();
    levels
}

/// Marching squares over a row-major grid.
///
/// Cells touching a NaN are skipped.
pub fn march_squares(data: &[f32], width: usize, height: usize, level: f32) -> Vec<Segment> {
    if width < 2 || height < 2 || data.len() != width * height {
        return vec![];
    }

    let mut segments = Vec::new();
    for y in 0..(height - 1) {
        for x in 0..(width - 1) {
            let tl = data[y * width + x];
            let tr = data[y * width + x + 1];
            let bl = data[(y + 1) * width + x];
            let br = data[(y + 1) * width + x + 1];

            if tl.is_nan() || tr.is_nan() || bl.is_nan() || br.is_nan() {
                continue;
            }

            let mut case = 0u8;
            if tl >= level { case |= 1; }
            if tr >= level { case |= 2; }
            if br >= level { case |= 4; }
            if bl >= level { case |= 8; }

            cell_segments(case, x as f32, y as f32, [tl, tr, br, bl], level, &mut segments);
        }
    }
    segments
}

fn cell_segments(case: u8, x: f32, y: f32, corners: [f32; 4], level: f32, out: &mut Vec<Segment>) {
    let [tl, tr, br, bl] = corners;
    let top = || interpolate_edge(x, y, x + 1.0, y, tl, tr, level);
    let right = || interpolate_edge(x + 1.0, y, x + 1.0, y + 1.0, tr, br, level);
    let bottom = || interpolate_edge(x, y + 1.0, x + 1.0, y + 1.0, bl, br, level);
    let left = || interpolate_edge(x, y, x, y + 1.0, tl, bl, level);
    let mut seg = |start: Point, end: Point| out.push(Segment { start, end });

    match case {
        1 | 14 => seg(left(), top()),
        2 | 13 => seg(top(), right()),
        3 | 12 => seg(left(), right()),
        4 | 11 => seg(right(), bottom()),
        6 | 9 => seg(top(), bottom()),
        7 | 8 => seg(left(), bottom()),
        // Saddles: resolve by the cell's mean value.
        5 | 10 => {
            let center_high = (tl + tr + br + bl) / 4.0 >= level;
            if (case == 5) == center_high {
                seg(left(), bottom());
                seg(top(), right());
            } else {
                seg(left(), top());
                seg(right(), bottom());
            }
        }
        _ => {}
    }
}

fn interpolate_edge(x1: f32, y1: f32, x2: f32, y2: f32, v1: f32, v2: f32, level: f32) -> Point {
    if (v2 - v1).abs() < 1e-6 {
        return Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0);
    }
    let t = ((level - v1) / (v2 - v1)).clamp(0.0, 1.0);
    Point::new(x1 + t * (x2 - x1), y1 + t * (y2 - y1))
}

/// Join unordered segments into polylines.
///
/// Lines are grown from both ends through shared endpoints. A line whose
/// ends meet is marked closed and repeats its first point at the end.
pub fn connect_segments(segments: &[Segment], level: f32) -> Vec<Contour> {
    let mut by_endpoint: HashMap<(i64, i64), Vec<usize>> = HashMap::with_capacity(segments.len() * 2);
    for (i, seg) in segments.iter().enumerate() {
        by_endpoint.entry(seg.start.key()).or_default().push(i);
        by_endpoint.entry(seg.end.key()).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let take_next = |at: Point, used: &mut [bool]| -> Option<Point> {
        let candidates = by_endpoint.get(&at.key())?;
        let &i = candidates.iter().find(|&&i| !used[i])?;
        used[i] = true;
        let seg = segments[i];
        Some(if seg.start.key() == at.key() { seg.end } else { seg.start })
    };

    let mut contours = Vec::new();
    for i in 0..segments.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut points = VecDeque::from([segments[i].start, segments[i].end]);

        while let Some(&tail) = points.back() {
            match take_next(tail, &mut used) {
                Some(p) => points.push_back(p),
                None => break,
            }
        }
        while let Some(&head) = points.front() {
            match take_next(head, &mut used) {
                Some(p) => points.push_front(p),
                None => break,
            }
        }

        let points: Vec<Point> = points.into_iter().collect();
        let closed = points.len() > 3 && points[0].key() == points[points.len() - 1].key();
        contours.push(Contour { level, points, closed });
    }
    contours
}

/// 1-D Gaussian smoothing with mirrored edges, kernel truncated at 4 sigma.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.len() < 2 {
        return values.to_vec();
    }

    let radius = (4.0 * sigma + 0.5) as i64;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    let n = values.len() as i64;

    (0..n)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, offset)| w * values[reflect(i + offset, n)])
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Mirror an index into `0..n` (edge sample repeated).
fn reflect(i: i64, n: i64) -> usize {
    let period = 2 * n;
    let i = i.rem_euclid(period);
    if i >= n {
        (period - 1 - i) as usize
    } else {
        i as usize
    }
}

/// Smooth x and y independently, re-closing rings afterwards.
pub fn smooth_contour(contour: &Contour, sigma: f64) -> Contour {
    if sigma <= 0.0 {
        return contour.clone();
    }
    let xs: Vec<f64> = contour.points.iter().map(|p| p.x as f64).collect();
    let ys: Vec<f64> = contour.points.iter().map(|p| p.y as f64).collect();
    let mut points: Vec<Point> = gaussian_smooth(&xs, sigma)
        .into_iter()
        .zip(gaussian_smooth(&ys, sigma))
        .map(|(x, y)| Point::new(x as f32, y as f32))
        .collect();

    if contour.closed {
        if let Some(&first) = points.first() {
            if let Some(last) = points.last_mut() {
                *last = first;
            }
        }
    }

    Contour {
        level: contour.level,
        points,
        closed: contour.closed,
    }
}

/// Sliding maximum over a `window` x `window` neighbourhood.
///
/// The window spans `window / 2` pixels before and `window - 1 - window / 2`
/// after each pixel, clipped at the raster edges. NaN counts as -inf.
pub fn maximum_filter(grid: &Array2<f32>, window: usize) -> Array2<f32> {
    let (height, width) = grid.dim();
    let window = window.max(1);
    let before = window / 2;
    let after = window - 1 - before;

    let mut rows = Array2::from_elem((height, width), f32::NEG_INFINITY);
    for (src, mut dst) in grid.outer_iter().zip(rows.outer_iter_mut()) {
        let line: Vec<f32> = src.iter().map(|v| if v.is_nan() { f32::NEG_INFINITY } else { *v }).collect();
        for (d, v) in dst.iter_mut().zip(sliding_max(&line, before, after)) {
            *d = v;
        }
    }

    let mut out = Array2::from_elem((height, width), f32::NEG_INFINITY);
    for col in 0..width {
        let line: Vec<f32> = rows.column(col).to_vec();
        for (row, v) in sliding_max(&line, before, after).into_iter().enumerate() {
            out[[row, col]] = v;
        }
    }
    out
}

fn sliding_max(input: &[f32], before: usize, after: usize) -> Vec<f32> {
    let n = input.len();
    let mut out = Vec::with_capacity(n);
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut next = 0;

    for i in 0..n {
        let hi = (i + after).min(n - 1);
        while next <= hi {
            while deque.back().map_or(false, |&b| input[b] <= input[next]) {
                deque.pop_back();
            }
            deque.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(before);
        while deque.front().map_or(false, |&f| f < lo) {
            deque.pop_front();
        }
        out.push(deque.front().map_or(f32::NEG_INFINITY, |&j| input[j]));
    }
    out
}

/// Contour and peak extraction for one scalar surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourExtractor {
    pub params: ContourParams,
    pub peak_window: usize,
    pub max_peaks: usize,
    pub nodata: f32,
}

impl ContourExtractor {
    pub fn new(params: ContourParams) -> Self {
        Self {
            params,
            peak_window: DEFAULT_PEAK_WINDOW,
            max_peaks: DEFAULT_MAX_PEAKS,
            nodata: 0.0,
        }
    }

    /// Extract lines and peaks.
    ///
    /// `transform` and `crs` describe the surface's grid; output coordinates
    /// are longitude/latitude and are clipped to `region`.
    pub fn extract(
        &self,
        values: ArrayView2<'_, f32>,
        mask: ArrayView2<'_, bool>,
        transform: &GeoTransform,
        crs: CrsCode,
        region: &Region,
    ) -> MosaicResult<ContourSet> {
        self.params.validate()?;
        if mask.dim() != values.dim() {
            return Err(MosaicError::GridMismatch(format!(
                "mask is {:?}, surface is {:?}",
                mask.dim(),
                values.dim()
            )));
        }

        let gap = self.params.gap;
        let quantized = quantize_grid(values, mask, self.nodata, gap);
        let levels = distinct_levels(&quantized);
        let (height, width) = quantized.dim();
        let flat: Vec<f32> = quantized.iter().copied().collect();

        let to_lonlat = |col: f64, row: f64| {
            let (x, y) = transform.pixel_to_geo(col + 0.5, row + 0.5);
            projection::to_geographic(crs, x, y)
        };

        let lines: Vec<ContourLine> = levels
            .par_iter()
            .flat_map_iter(|&level| {
                // The boundary between bins sits halfway between the steps.
                let threshold = (level - gap / 2.0) as f32;
                let traced = connect_segments(&march_squares(&flat, width, height, threshold), level as f32);
                traced
                    .into_iter()
                    .filter(|c| c.points.len() >= self.params.min_vertices)
                    .filter_map(|c| {
                        let smoothed = smooth_contour(&c, self.params.smoothing_sigma);
                        let coords: Vec<[f64; 2]> = smoothed
                            .points
                            .iter()
                            .map(|p| {
                                let (lon, lat) = to_lonlat(p.x as f64, p.y as f64);
                                [lon, lat]
                            })
                            .collect();
                        Geometry::lines(region.clip_line(&coords))
                    })
                    .map(|geometry| ContourLine { level, geometry })
                    .collect::<Vec<_>>()
            })
            .collect();

        let peaks = self.find_peaks(values, mask, &to_lonlat, region);

        tracing::debug!(
            levels = levels.len(),
            lines = lines.len(),
            peaks = peaks.len(),
            gap,
            "Extracted contours"
        );

        Ok(ContourSet { lines, peaks })
    }

    fn find_peaks(
        &self,
        values: ArrayView2<'_, f32>,
        mask: ArrayView2<'_, bool>,
        to_lonlat: &dyn Fn(f64, f64) -> (f64, f64),
        region: &Region,
    ) -> Vec<Peak> {
        let surface = Array2::from_shape_fn(values.dim(), |(r, c)| {
            let v = values[[r, c]];
            if mask[[r, c]] && v != self.nodata && v.is_finite() {
                v
            } else {
                f32::NAN
            }
        });
        let local_max = maximum_filter(&surface, self.peak_window);

        let mut candidates: Vec<(f32, f64, f64)> = surface
            .indexed_iter()
            .filter(|&((r, c), &v)| !v.is_nan() && v != 0.0 && v == local_max[[r, c]])
            .filter_map(|((r, c), &v)| {
                let (lon, lat) = to_lonlat(c as f64, r as f64);
                region.contains(lon, lat).then_some((v, lon, lat))
            })
            .collect();

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates
            .into_iter()
            .take(self.max_peaks)
            .map(|(v, lon, lat)| Peak {
                lon,
                lat,
                level: quantize(v as f64, self.params.gap),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_bins() {
        assert_eq!(quantize(3.0, 10.0), 0.0);
        assert_eq!(quantize(7.0, 10.0), 0.0);
        assert_eq!(quantize(12.0, 10.0), 10.0);
        assert_eq!(quantize(18.0, 10.0), 10.0);
        assert_eq!(quantize(20.0, 10.0), 20.0);
        assert_eq!(quantize(-3.0, 10.0), -10.0);
    }

    #[test]
    fn test_interpolate_edge() {
        let p = interpolate_edge(0.0, 0.0, 1.0, 0.0, 0.0, 10.0, 5.0);
        assert!((p.x - 0.5).abs() < 0.01);
        assert!(p.y.abs() < 0.01);
    }

    #[test]
    fn test_reflect_indices() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(2, 5), 2);
    }

    #[test]
    fn test_gaussian_preserves_constant() {
        let smoothed = gaussian_smooth(&[4.0; 7], 2.0);
        for v in smoothed {
            assert!((v - 4.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sliding_max() {
        let out = sliding_max(&[1.0, 3.0, 2.0, 0.0, 5.0], 1, 1);
        assert_eq!(out, vec![3.0, 3.0, 3.0, 5.0, 5.0]);
    }

    #[test]
    fn test_march_squares_flat() {
        let data = vec![5.0; 9];
        assert!(march_squares(&data, 3, 3, 5.0).is_empty());
    }

    #[test]
    fn test_ring_around_peak_is_closed() {
        let data = vec![
            0.0, 0.0, 0.0, 0.0, //
            0.0, 10.0, 10.0, 0.0, //
            0.0, 10.0, 10.0, 0.0, //
            0.0, 0.0, 0.0, 0.0,
        ];
        let segments = march_squares(&data, 4, 4, 5.0);
        let contours = connect_segments(&segments, 5.0);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(contours[0].points.len(), 9);
    }

    #[test]
    fn test_invalid_params() {
        assert!(ContourParams::new(0.0, 3, 1.0).is_err());
        assert!(ContourParams::new(10.0, 3, -1.0).is_err());
        assert!(ContourParams::new(10.0, 3, 0.0).is_ok());
    }
}
