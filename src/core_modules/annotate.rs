// THEORY:
// Annotation paints the tracking result onto the (cropped, zoomed) frame for display.
// Colours are BGR triples because they are written straight into the frame buffer.

use crate::core_modules::ellipse::{Ellipse, EllipseRaster};
use crate::core_modules::frame::Frame;
use crate::core_modules::lock_gate::ToleranceState;
use image::Rgb;
use imageproc::drawing::draw_filled_circle_mut;

pub const CENTER_COLOR: [u8; 3] = [255, 255, 0];
pub const UNLOCKED_ELLIPSE_COLOR: [u8; 3] = [255, 0, 0];
pub const WITHIN_TOLERANCE_COLOR: [u8; 3] = [0, 255, 0];
pub const OUT_OF_TOLERANCE_COLOR: [u8; 3] = [255, 0, 0];

pub const CENTER_RADIUS: i32 = 3;
pub const ELLIPSE_THICKNESS: f64 = 2.0;

pub fn tolerance_color(state: ToleranceState) -> [u8; 3] {
    match state {
        ToleranceState::WithinTolerance => WITHIN_TOLERANCE_COLOR,
        ToleranceState::OutOfTolerance => OUT_OF_TOLERANCE_COLOR,
    }
}

/// Filled dot on the pupil centre.
pub fn draw_pupil_center(frame: &mut Frame, center: (f64, f64)) {
    let (x, y) = (center.0.round() as i32, center.1.round() as i32);
    draw_filled_circle_mut(frame.buffer_mut(), (x, y), CENTER_RADIUS, Rgb(CENTER_COLOR));
}

/// Ellipse outline `thickness` pixels wide.
pub fn draw_ellipse(frame: &mut Frame, ellipse: &Ellipse, color: [u8; 3], thickness: f64) {
    if !ellipse.is_valid() {
        return;
    }
    let (width, height) = frame.dimensions();
    let buffer = frame.buffer_mut();
    EllipseRaster::new(*ellipse).for_each_in_band(width, height, thickness, |x, y| {
        buffer.put_pixel(x, y, Rgb(color));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_dot_has_radius_three() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0]).unwrap();
        draw_pupil_center(&mut frame, (10.2, 9.8));
        assert_eq!(frame.bgr_at(10, 10), CENTER_COLOR);
        assert_eq!(frame.bgr_at(13, 10), CENTER_COLOR);
        assert_eq!(frame.bgr_at(15, 10), [0, 0, 0]);
    }

    #[test]
    fn ellipse_outline_leaves_interior_untouched() {
        let mut frame = Frame::filled(100, 100, [0, 0, 0]).unwrap();
        let ellipse = Ellipse {
            cx: 50.0,
            cy: 50.0,
            semi_major: 30.0,
            semi_minor: 20.0,
            angle: 0.0,
        };
        draw_ellipse(&mut frame, &ellipse, tolerance_color(ToleranceState::WithinTolerance), 2.0);
        assert_eq!(frame.bgr_at(80, 50), WITHIN_TOLERANCE_COLOR);
        assert_eq!(frame.bgr_at(50, 30), WITHIN_TOLERANCE_COLOR);
        assert_eq!(frame.bgr_at(50, 50), [0, 0, 0]);
        assert_eq!(frame.bgr_at(5, 5), [0, 0, 0]);
    }

    #[test]
    fn centre_near_the_border_is_clipped() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]).unwrap();
        draw_pupil_center(&mut frame, (0.0, 0.0));
        assert_eq!(frame.bgr_at(0, 0), CENTER_COLOR);
    }
}
