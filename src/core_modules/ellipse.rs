// THEORY:
// The ellipse model shared by the contour analyzer and the final fit, plus a
// rasteriser that answers "is this pixel inside / near the outline?".
//
// Fitting follows the numerically stable form of Fitzgibbon's direct method
// (Halíř & Flusser): the 6x6 scatter matrix is split into quadratic and linear
// blocks, the linear part is eliminated, and the remaining 3x3 eigenproblem is
// solved for the single eigenvector satisfying the ellipse constraint
// `4AC - B² > 0`. Points are centred and scaled first.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
use std::f64::consts::{FRAC_PI_2, PI};

/// Minimum number of points needed to determine the five ellipse parameters.
pub const MIN_FIT_POINTS: usize = 5;

/// A rotated ellipse in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    /// Semi-major axis length.
    pub semi_major: f64,
    /// Semi-minor axis length.
    pub semi_minor: f64,
    /// Angle of the major axis from +x, radians in (-π/2, π/2].
    pub angle: f64,
}

impl Ellipse {
    pub fn center(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    /// Full axis lengths as `(minor, major)`.
    pub fn axes(&self) -> (f64, f64) {
        (2.0 * self.semi_minor, 2.0 * self.semi_major)
    }

    pub fn area(&self) -> f64 {
        PI * self.semi_major * self.semi_minor
    }

    pub fn is_valid(&self) -> bool {
        self.semi_major > 0.0
            && self.semi_minor > 0.0
            && self.semi_major.is_finite()
            && self.semi_minor.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.angle.is_finite()
    }

    /// `n` points evenly spaced in parameter along the boundary.
    pub fn boundary_points(&self, n: usize) -> Vec<(f64, f64)> {
        let (sin, cos) = self.angle.sin_cos();
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                let (u, v) = (self.semi_major * t.cos(), self.semi_minor * t.sin());
                (self.cx + u * cos - v * sin, self.cy + u * sin + v * cos)
            })
            .collect()
    }
}

/// Fits an ellipse to `points`. Returns `None` for fewer than
/// [`MIN_FIT_POINTS`] points or when the points do not determine an ellipse
/// (collinear, coincident, or hyperbolic best fit).
pub fn fit_ellipse(points: &[(f64, f64)]) -> Option<Ellipse> {
    if points.len() < MIN_FIT_POINTS {
        return None;
    }

    // --- 1. Normalise: centre on the mean, mean distance ≈ √2 ---
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - mean_x).powi(2) + (p.1 - mean_y).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let scale = std::f64::consts::SQRT_2 / mean_dist;

    // --- 2. Scatter matrix of the design rows [x², xy, y², x, y, 1] ---
    let mut scatter = Matrix6::<f64>::zeros();
    for &(px, py) in points {
        let x = (px - mean_x) * scale;
        let y = (py - mean_y) * scale;
        let row = Vector6::new(x * x, x * y, y * y, x, y, 1.0);
        scatter += row * row.transpose();
    }

    let s1: Matrix3<f64> = scatter.fixed_view::<3, 3>(0, 0).into_owned();
    let s2: Matrix3<f64> = scatter.fixed_view::<3, 3>(0, 3).into_owned();
    let s3: Matrix3<f64> = scatter.fixed_view::<3, 3>(3, 3).into_owned();

    // --- 3. Reduced eigenproblem ---
    let t = -(s3.try_inverse()? * s2.transpose());
    let m = s1 + s2 * t;
    // Premultiply by the inverse of the constraint matrix [[0,0,2],[0,-1,0],[2,0,0]].
    let reduced = Matrix3::new(
        m[(2, 0)] * 0.5,
        m[(2, 1)] * 0.5,
        m[(2, 2)] * 0.5,
        -m[(1, 0)],
        -m[(1, 1)],
        -m[(1, 2)],
        m[(0, 0)] * 0.5,
        m[(0, 1)] * 0.5,
        m[(0, 2)] * 0.5,
    );

    let a1 = constrained_eigenvector(&reduced)?;
    let a2 = t * a1;

    // --- 4. Back to frame coordinates ---
    let coeffs = denormalize(
        &Vector6::new(a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]),
        mean_x,
        mean_y,
        scale,
    );
    conic_to_ellipse(coeffs)
}

/// Eigenvector of `system` that satisfies `4·v0·v2 − v1² > 0`. When several
/// do (numerical noise), the one with the smallest eigenvalue magnitude wins.
fn constrained_eigenvector(system: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let magnitude = system.norm().max(1e-300);
    let mut best: Option<(f64, Vector3<f64>)> = None;

    for eigenvalue in system.complex_eigenvalues().iter() {
        if eigenvalue.im.abs() > 1e-9 * magnitude {
            continue;
        }
        let lambda = eigenvalue.re;
        let Some(v) = null_vector(&(system - Matrix3::identity() * lambda)) else {
            continue;
        };
        if 4.0 * v[0] * v[2] - v[1] * v[1] <= 0.0 {
            continue;
        }
        if best.is_none_or(|(best_lambda, _)| lambda.abs() < best_lambda) {
            best = Some((lambda.abs(), v));
        }
    }

    best.map(|(_, v)| v)
}

/// Null vector of a rank-2 3x3 matrix: the longest cross product of two of its rows.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let rows = [m.row(0).transpose(), m.row(1).transpose(), m.row(2).transpose()];
    let candidates = [
        rows[1].cross(&rows[2]),
        rows[2].cross(&rows[0]),
        rows[0].cross(&rows[1]),
    ];
    let best = candidates
        .into_iter()
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;
    let norm = best.norm();
    if norm < 1e-15 {
        return None;
    }
    Some(best / norm)
}

/// Undo `x' = s(x - mx), y' = s(y - my)` on conic coefficients.
fn denormalize(c: &Vector6<f64>, mx: f64, my: f64, s: f64) -> [f64; 6] {
    let s2 = s * s;
    let (a, b, cc, d, e, f) = (c[0] * s2, c[1] * s2, c[2] * s2, c[3] * s, c[4] * s, c[5]);
    [
        a,
        b,
        cc,
        d - 2.0 * a * mx - b * my,
        e - b * mx - 2.0 * cc * my,
        f + a * mx * mx + b * mx * my + cc * my * my - d * mx - e * my,
    ]
}

/// Geometric parameters of `A x² + B xy + C y² + D x + E y + F = 0`.
fn conic_to_ellipse([a, b, c, d, e, f]: [f64; 6]) -> Option<Ellipse> {
    let discriminant = b * b - 4.0 * a * c;
    if discriminant >= 0.0 || !discriminant.is_finite() {
        return None;
    }

    let cx = (2.0 * c * d - b * e) / discriminant;
    let cy = (2.0 * a * e - b * d) / discriminant;
    let f_center = a * cx * cx + b * cx * cy + c * cy * cy + d * cx + e * cy + f;

    let half_sum = (a + c) / 2.0;
    let radius = (((a - c) / 2.0).powi(2) + (b / 2.0).powi(2)).sqrt();
    let lambda_max = half_sum + radius;
    let lambda_min = half_sum - radius;

    // `theta` is the direction whose quadratic-form value is `lambda_max`.
    let theta = 0.5 * b.atan2(a - c);
    let along_theta_sq = -f_center / lambda_max;
    let across_theta_sq = -f_center / lambda_min;
    if !(along_theta_sq > 0.0 && across_theta_sq > 0.0) {
        return None;
    }
    let along_theta = along_theta_sq.sqrt();
    let across_theta = across_theta_sq.sqrt();

    let (semi_major, semi_minor, angle) = if along_theta >= across_theta {
        (along_theta, across_theta, theta)
    } else {
        (across_theta, along_theta, theta + FRAC_PI_2)
    };

    let ellipse = Ellipse {
        cx,
        cy,
        semi_major,
        semi_minor,
        angle: wrap_half_turn(angle),
    };
    ellipse.is_valid().then_some(ellipse)
}

/// Wraps an axis angle into (-π/2, π/2].
fn wrap_half_turn(angle: f64) -> f64 {
    let mut a = angle % PI;
    if a > FRAC_PI_2 {
        a -= PI;
    } else if a <= -FRAC_PI_2 {
        a += PI;
    }
    a
}

/// Pixel-level queries against an ellipse: interior membership and
/// outline bands of a given thickness.
#[derive(Debug, Clone, Copy)]
pub struct EllipseRaster {
    ellipse: Ellipse,
    cos: f64,
    sin: f64,
}

impl EllipseRaster {
    pub fn new(ellipse: Ellipse) -> Self {
        let (sin, cos) = ellipse.angle.sin_cos();
        Self { ellipse, cos, sin }
    }

    /// `(distance from centre, normalised radius)`; the boundary has radius 1.
    fn polar(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.ellipse.cx;
        let dy = y - self.ellipse.cy;
        let u = (dx * self.cos + dy * self.sin) / self.ellipse.semi_major;
        let v = (-dx * self.sin + dy * self.cos) / self.ellipse.semi_minor;
        ((dx * dx + dy * dy).sqrt(), (u * u + v * v).sqrt())
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polar(x, y).1 <= 1.0
    }

    /// Distance to the boundary measured along the ray from the centre.
    pub fn boundary_distance(&self, x: f64, y: f64) -> f64 {
        let (rho, r) = self.polar(x, y);
        if r <= f64::EPSILON {
            return self.ellipse.semi_minor;
        }
        rho * (1.0 - 1.0 / r).abs()
    }

    /// True when `(x, y)` lies on an outline drawn `thickness` pixels wide.
    pub fn in_band(&self, x: f64, y: f64, thickness: f64) -> bool {
        self.boundary_distance(x, y) <= thickness / 2.0
    }

    /// Inclusive pixel bounds of the ellipse grown by `pad`, clipped to the
    /// image. `None` when the ellipse lies entirely outside.
    pub fn bounds(&self, width: u32, height: u32, pad: f64) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let (a, b) = (self.ellipse.semi_major, self.ellipse.semi_minor);
        let half_w = (a * a * self.cos * self.cos + b * b * self.sin * self.sin).sqrt() + pad;
        let half_h = (a * a * self.sin * self.sin + b * b * self.cos * self.cos).sqrt() + pad;

        let x0 = (self.ellipse.cx - half_w).floor().max(0.0);
        let y0 = (self.ellipse.cy - half_h).floor().max(0.0);
        let x1 = (self.ellipse.cx + half_w).ceil().min(width as f64 - 1.0);
        let y1 = (self.ellipse.cy + half_h).ceil().min(height as f64 - 1.0);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Visits every pixel inside the ellipse.
    pub fn for_each_filled(&self, width: u32, height: u32, mut f: impl FnMut(u32, u32)) {
        let Some((x0, y0, x1, y1)) = self.bounds(width, height, 0.0) else {
            return;
        };
        for y in y0..=y1 {
            for x in x0..=x1 {
                if self.contains(x as f64, y as f64) {
                    f(x, y);
                }
            }
        }
    }

    /// Visits every pixel on the outline band of the given thickness.
    pub fn for_each_in_band(
        &self,
        width: u32,
        height: u32,
        thickness: f64,
        mut f: impl FnMut(u32, u32),
    ) {
        let Some((x0, y0, x1, y1)) = self.bounds(width, height, thickness / 2.0 + 1.0) else {
            return;
        };
        for y in y0..=y1 {
            for x in x0..=x1 {
                if self.in_band(x as f64, y as f64, thickness) {
                    f(x, y);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ellipse(cx: f64, cy: f64, a: f64, b: f64, angle: f64) -> Ellipse {
        Ellipse {
            cx,
            cy,
            semi_major: a,
            semi_minor: b,
            angle,
        }
    }

    fn angle_gap(a: f64, b: f64) -> f64 {
        let d = (a - b).abs() % PI;
        d.min(PI - d)
    }

    #[test]
    fn fits_exact_points() {
        for truth in [
            ellipse(100.0, 80.0, 30.0, 15.0, 0.3),
            ellipse(320.0, 240.0, 20.0, 15.0, 0.0),
            ellipse(50.0, 60.0, 40.0, 10.0, -1.1),
            ellipse(200.0, 150.0, 25.0, 24.0, FRAC_PI_2),
        ] {
            let fitted = fit_ellipse(&truth.boundary_points(60)).expect("fit should succeed");
            assert_relative_eq!(fitted.cx, truth.cx, epsilon = 1e-6);
            assert_relative_eq!(fitted.cy, truth.cy, epsilon = 1e-6);
            assert_relative_eq!(fitted.semi_major, truth.semi_major, epsilon = 1e-6);
            assert_relative_eq!(fitted.semi_minor, truth.semi_minor, epsilon = 1e-6);
            assert!(angle_gap(fitted.angle, truth.angle) < 1e-6);
        }
    }

    #[test]
    fn fits_circle() {
        let truth = ellipse(50.0, 50.0, 20.0, 20.0, 0.0);
        let fitted = fit_ellipse(&truth.boundary_points(100)).unwrap();
        assert_relative_eq!(fitted.cx, 50.0, epsilon = 1e-6);
        assert_relative_eq!(fitted.semi_major, 20.0, epsilon = 1e-6);
        assert_relative_eq!(fitted.semi_minor, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn fits_integer_pixel_outline() {
        let truth = ellipse(120.0, 90.0, 24.0, 19.0, 0.0);
        let pixels: Vec<(f64, f64)> = truth
            .boundary_points(400)
            .into_iter()
            .map(|(x, y)| (x.round(), y.round()))
            .collect();
        let fitted = fit_ellipse(&pixels).unwrap();
        assert_relative_eq!(fitted.cx, 120.0, epsilon = 0.5);
        assert_relative_eq!(fitted.cy, 90.0, epsilon = 0.5);
        assert_relative_eq!(fitted.semi_major, 24.0, epsilon = 1.0);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(fit_ellipse(&[]).is_none());
        assert!(fit_ellipse(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0), (3.0, 1.0)]).is_none());
        assert!(fit_ellipse(&[(5.0, 5.0); 10]).is_none());
    }

    #[test]
    fn axes_are_reported_minor_then_major() {
        let e = ellipse(0.0, 0.0, 20.0, 15.0, 0.0);
        assert_eq!(e.axes(), (30.0, 40.0));
        assert_relative_eq!(e.area(), PI * 300.0);
    }

    #[test]
    fn raster_fill_matches_area() {
        let raster = EllipseRaster::new(ellipse(100.0, 100.0, 30.0, 20.0, 0.4));
        let mut count = 0usize;
        raster.for_each_filled(200, 200, |_, _| count += 1);
        let area = PI * 30.0 * 20.0;
        assert!((count as f64 - area).abs() / area < 0.03, "count = {count}");
    }

    #[test]
    fn thicker_bands_cover_more_pixels() {
        let raster = EllipseRaster::new(ellipse(100.0, 100.0, 30.0, 20.0, 0.0));
        let count = |t: f64| {
            let mut n = 0usize;
            raster.for_each_in_band(200, 200, t, |_, _| n += 1);
            n
        };
        assert!(count(4.0) < count(10.0));
        assert!(raster.in_band(130.0, 100.0, 1.0));
        assert!(!raster.in_band(100.0, 100.0, 4.0));
    }

    #[test]
    fn bounds_clip_to_image() {
        let raster = EllipseRaster::new(ellipse(5.0, 5.0, 30.0, 20.0, 0.0));
        assert_eq!(raster.bounds(50, 50, 0.0), Some((0, 0, 35, 25)));
        let outside = EllipseRaster::new(ellipse(-100.0, -100.0, 10.0, 10.0, 0.0));
        assert_eq!(outside.bounds(50, 50, 0.0), None);
    }
}
