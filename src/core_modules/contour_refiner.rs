// THEORY:
// Eyelashes and glints leave kinks on the pupil border that point away from the
// pupil. An ellipse fitted through those kinks is pulled outward and tilted. The
// refiner looks at every contour point together with two neighbours `spacing`
// points behind and ahead (wrapping around the closed contour). The two chords from
// the point to its neighbours are averaged; on a convex pupil border that average
// points inward, towards the contour centroid. Points whose average chord does not
// lean towards the centroid are dropped.
//
// The refiner never fails. Short contours are returned untouched, and if the filter
// removes everything an even subsample of the input is returned instead.

use crate::core_modules::contour_analyzer::Contour;
use crate::core_modules::frame::Point;

/// Neighbour offset is `len / SPACING_DIVISOR`.
const SPACING_DIVISOR: usize = 25;
/// Fallback subsample step is `len / FALLBACK_DIVISOR`.
const FALLBACK_DIVISOR: usize = 20;

/// `cos(60°)`: minimum dot product between the centroid direction and the mean chord.
fn keep_threshold() -> f64 {
    60f64.to_radians().cos()
}

/// Neighbour offset for a contour of `n` points, kept below `n / 3` so the two
/// neighbours never coincide with each other or the point itself.
fn spacing(n: usize) -> usize {
    (n / SPACING_DIVISOR).min(n / 3).max(1)
}

/// Drops outward-facing kinks from `contour`. Point order is preserved.
pub fn refine(contour: &Contour) -> Contour {
    let points = contour.points();
    let n = points.len();
    if n < 3 {
        return contour.clone();
    }
    let Some((cx, cy)) = contour.centroid() else {
        return contour.clone();
    };

    let step = spacing(n);
    let threshold = keep_threshold();

    let kept: Vec<Point> = (0..n)
        .filter(|&i| {
            let (px, py) = points[i].as_f64();
            let (ax, ay) = points[(i + n - step) % n].as_f64();
            let (bx, by) = points[(i + step) % n].as_f64();

            let (v1x, v1y) = (ax - px, ay - py);
            let (v2x, v2y) = (bx - px, by - py);
            if (v1x == 0.0 && v1y == 0.0) || (v2x == 0.0 && v2y == 0.0) {
                return false;
            }

            let (mx, my) = ((v1x + v2x) / 2.0, (v1y + v2y) / 2.0);
            (cx - px) * mx + (cy - py) * my >= threshold
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        let step = (n / FALLBACK_DIVISOR).max(1);
        return Contour::new(points.iter().step_by(step).copied().collect());
    }
    Contour::new(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn circle(cx: f64, cy: f64, r: f64, n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                Point::new(
                    (cx + r * t.cos()).round() as u32,
                    (cy + r * t.sin()).round() as u32,
                )
            })
            .collect()
    }

    #[test]
    fn short_contours_are_returned_unchanged() {
        let two = Contour::new(vec![Point::new(1, 1), Point::new(5, 5)]);
        assert_eq!(refine(&two), two);
        assert_eq!(refine(&Contour::default()), Contour::default());
    }

    #[test]
    fn convex_contour_survives_intact() {
        let contour = Contour::new(circle(100.0, 100.0, 40.0, 200));
        let refined = refine(&contour);
        assert_eq!(refined.len(), contour.len());
    }

    #[test]
    fn inward_notch_is_removed() {
        let mut points = circle(100.0, 100.0, 40.0, 200);
        // Point 0 sits at (140, 100); pull it deep into the pupil.
        points[0] = Point::new(110, 100);
        let contour = Contour::new(points);

        let refined = refine(&contour);
        assert!(!refined.points().contains(&Point::new(110, 100)));
        assert!(refined.len() >= 190);
    }

    #[test]
    fn points_flanking_an_outward_spike_are_removed() {
        let mut points = circle(100.0, 100.0, 40.0, 200);
        points[0] = Point::new(175, 100);
        let contour = Contour::new(points);

        // Point 8 (139, 110) sees the spike as its previous neighbour, so its mean
        // chord leans away from the centroid.
        let refined = refine(&contour);
        assert!(!refined.points().contains(&Point::new(139, 110)));
        assert!(!refined.points().contains(&Point::new(139, 90)));
        assert!(refined.len() < contour.len());
    }

    #[test]
    fn spacing_never_degenerates() {
        assert_eq!(spacing(3), 1);
        assert_eq!(spacing(10), 1);
        assert_eq!(spacing(100), 4);
        assert_eq!(spacing(1000), 40);
    }

    #[test]
    fn all_rejected_falls_back_to_even_subsample() {
        // Every chord has zero length, so no point can be judged.
        let points = vec![Point::new(7, 7); 40];
        let refined = refine(&Contour::new(points));
        assert_eq!(refined.len(), 20);
    }
}
