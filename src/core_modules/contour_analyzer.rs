// THEORY:
// The contour analyzer turns one binary threshold mask into at most one scored pupil
// candidate. It runs the same steps for every level of the threshold bank:
//
//   1. Dilate the mask (5x5 square, twice) to close glints and eyelash gaps.
//   2. Trace the outer borders of the dilated mask.
//   3. Drop borders that are too small or too elongated to be a pupil, and keep the
//      largest survivor.
//   4. Fit an ellipse to that border.
//   5. Score how well the ellipse explains the mask.
//
// The score multiplies three terms. The fill ratio asks "is the ellipse solid?",
// the squared thick-band overlap rewards candidates whose outline is long and sits on
// the ellipse, and the thin-band ratio asks "is the outline actually elliptical?".
// Squaring the absolute term makes a large, well-supported pupil beat a tiny perfect
// one. Scores are only compared against each other, never against a fixed bar.

use crate::core_modules::ellipse::{fit_ellipse, Ellipse, EllipseRaster, MIN_FIT_POINTS};
use crate::core_modules::frame::Point;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_line_segment_mut;
use imageproc::morphology::dilate;

/// A closed polygon traced around one connected mask region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enclosed polygon area (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let (x0, y0) = self.points[i].as_f64();
                let (x1, y1) = self.points[(i + 1) % n].as_f64();
                x0 * y1 - x1 * y0
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Inclusive bounding box as `(x, y, width, height)`.
    pub fn bounding_box(&self) -> Option<(u32, u32, u32, u32)> {
        let first = self.points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some((x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }

    /// Long side over short side of the bounding box.
    pub fn aspect_ratio(&self) -> f64 {
        match self.bounding_box() {
            Some((_, _, w, h)) => w.max(h) as f64 / w.min(h) as f64,
            None => f64::INFINITY,
        }
    }

    /// Mean of the contour points.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self.points.iter().fold((0.0, 0.0), |(sx, sy), p| {
            (sx + p.x as f64, sy + p.y as f64)
        });
        Some((sx / n, sy / n))
    }

    pub fn to_f64_points(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(Point::as_f64).collect()
    }
}

/// Tuning for one `analyze` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerParams {
    /// Minimum enclosed area of a candidate contour, in pixels.
    pub min_area: f64,
    /// Maximum bounding-box aspect ratio of a candidate contour.
    pub max_aspect_ratio: f64,
    /// Chebyshev radius of the dilation kernel (2 gives a 5x5 square).
    pub dilation_radius: u8,
    pub dilation_iterations: usize,
    /// Width of the tight outline band used for the border-coverage ratio.
    pub thin_band: f64,
    /// Width of the loose outline band used for the absolute coverage.
    pub thick_band: f64,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            min_area: 1000.0,
            max_aspect_ratio: 3.0,
            dilation_radius: 2,
            dilation_iterations: 2,
            thin_band: 4.0,
            thick_band: 10.0,
        }
    }
}

/// The three goodness terms of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GoodnessMetrics {
    /// Share of the ellipse interior that is mask foreground, in [0, 1].
    pub fill_ratio: f64,
    /// Share of the contour outline lying on the thin ellipse band, in [0, 1].
    pub border_coverage: f64,
    /// Outline pixels lying on the thick ellipse band.
    pub absolute_coverage: u64,
}

impl GoodnessMetrics {
    pub fn score(&self) -> f64 {
        let absolute = self.absolute_coverage as f64;
        self.fill_ratio * absolute * absolute * self.border_coverage
    }
}

/// Best candidate of one mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourAnalysis {
    pub contour: Contour,
    pub ellipse: Ellipse,
    pub metrics: GoodnessMetrics,
    pub score: f64,
}

/// Grows the foreground of `mask` with a square kernel.
pub fn dilate_mask(mask: &GrayImage, params: &AnalyzerParams) -> GrayImage {
    let mut dilated = mask.clone();
    for _ in 0..params.dilation_iterations {
        dilated = dilate(&dilated, Norm::LInf, params.dilation_radius);
    }
    dilated
}

/// Outer borders of every top-level foreground region.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect()))
        .collect()
}

/// Largest contour passing the area and aspect-ratio filters. The first one wins
/// on equal areas.
pub fn largest_plausible(contours: Vec<Contour>, params: &AnalyzerParams) -> Option<Contour> {
    let mut best: Option<(f64, Contour)> = None;
    for contour in contours {
        let area = contour.area();
        if area < params.min_area || contour.aspect_ratio() > params.max_aspect_ratio {
            continue;
        }
        if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
            best = Some((area, contour));
        }
    }
    best.map(|(_, contour)| contour)
}

/// Scores `ellipse` against the dilated mask it was fitted from.
pub fn goodness(
    dilated: &GrayImage,
    contour: &Contour,
    ellipse: &Ellipse,
    params: &AnalyzerParams,
) -> GoodnessMetrics {
    let (width, height) = dilated.dimensions();
    let raster = EllipseRaster::new(*ellipse);

    // --- Fill ratio ---
    let mut interior = 0u64;
    let mut covered = 0u64;
    raster.for_each_filled(width, height, |x, y| {
        interior += 1;
        if dilated.get_pixel(x, y).0[0] > 0 {
            covered += 1;
        }
    });
    let fill_ratio = if interior == 0 {
        0.0
    } else {
        covered as f64 / interior as f64
    };

    // --- Outline overlap ---
    let outline = rasterize_outline(contour, width, height);
    let (mut total, mut thin, mut thick) = (0u64, 0u64, 0u64);
    if let Some((x0, y0, w, h)) = contour.bounding_box() {
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                if outline.get_pixel(x, y).0[0] == 0 {
                    continue;
                }
                total += 1;
                let distance = raster.boundary_distance(x as f64, y as f64);
                if distance <= params.thin_band / 2.0 {
                    thin += 1;
                }
                if distance <= params.thick_band / 2.0 {
                    thick += 1;
                }
            }
        }
    }
    let border_coverage = if total == 0 {
        0.0
    } else {
        thin as f64 / total as f64
    };

    GoodnessMetrics {
        fill_ratio,
        border_coverage,
        absolute_coverage: thick,
    }
}

/// One-pixel closed polyline through the contour points.
fn rasterize_outline(contour: &Contour, width: u32, height: u32) -> GrayImage {
    let mut outline = GrayImage::new(width, height);
    let points = contour.points();
    for (i, start) in points.iter().enumerate() {
        let end = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            &mut outline,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            Luma([255u8]),
        );
    }
    outline
}

/// Full per-mask analysis. `None` when no contour survives the filters or no
/// ellipse can be fitted to the survivor.
pub fn analyze(mask: &GrayImage, params: &AnalyzerParams) -> Option<ContourAnalysis> {
    let dilated = dilate_mask(mask, params);
    let contour = largest_plausible(external_contours(&dilated), params)?;
    if contour.len() < MIN_FIT_POINTS {
        return None;
    }

    let ellipse = fit_ellipse(&contour.to_f64_points())?;
    let metrics = goodness(&dilated, &contour, &ellipse, params);
    let score = if ellipse.area() > 0.0 { metrics.score() } else { 0.0 };

    Some(ContourAnalysis {
        contour,
        ellipse,
        metrics,
        score,
    })
}
