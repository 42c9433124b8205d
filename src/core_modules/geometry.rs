// THEORY:
// The `geometry` module holds the stateless image-buffer transforms that run before
// any analysis: normalising the raw camera frame to the canonical working aspect
// ratio and size, optionally zooming into a region of interest, and zeroing a
// binary mask outside a square neighbourhood. None of these functions keeps state
// or knows about pupils; they only move pixels around.

use crate::core_modules::frame::{Frame, Point};
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Zoom centre expressed as ratios (0..1) of the frame width and height.
/// Serialised as an `[x_ratio, y_ratio]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct ZoomCenter {
    pub x_ratio: f64,
    pub y_ratio: f64,
}

impl ZoomCenter {
    pub fn new(x_ratio: f64, y_ratio: f64) -> Self {
        Self { x_ratio, y_ratio }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x_ratio) && (0.0..=1.0).contains(&self.y_ratio)
    }
}

impl From<(f64, f64)> for ZoomCenter {
    fn from((x_ratio, y_ratio): (f64, f64)) -> Self {
        Self { x_ratio, y_ratio }
    }
}

impl From<ZoomCenter> for (f64, f64) {
    fn from(center: ZoomCenter) -> Self {
        (center.x_ratio, center.y_ratio)
    }
}

/// Crops the frame around its centre to the `width:height` aspect ratio, then
/// resizes it to exactly `width x height`. A frame that already has the target
/// size is returned unchanged.
pub fn crop_to_aspect_ratio(frame: &Frame, width: u32, height: u32) -> Frame {
    let (current_width, current_height) = frame.dimensions();
    if (current_width, current_height) == (width, height) || width == 0 || height == 0 {
        return frame.clone();
    }

    let desired_ratio = width as f64 / height as f64;
    let current_ratio = current_width as f64 / current_height as f64;

    let (x, y, crop_width, crop_height) = if current_ratio > desired_ratio {
        // Too wide: trim the left and right edges.
        let new_width = ((desired_ratio * current_height as f64) as u32).clamp(1, current_width);
        ((current_width - new_width) / 2, 0, new_width, current_height)
    } else {
        // Too tall: trim the top and bottom edges.
        let new_height = ((current_width as f64 / desired_ratio) as u32).clamp(1, current_height);
        (0, (current_height - new_height) / 2, current_width, new_height)
    };

    let cropped = imageops::crop_imm(frame.buffer(), x, y, crop_width, crop_height).to_image();
    if cropped.dimensions() == (width, height) {
        return Frame::from_buffer(cropped);
    }
    Frame::from_buffer(imageops::resize(&cropped, width, height, FilterType::Triangle))
}

/// Zooms into the frame by cropping a `1 / zoom_factor` window around `center`
/// (frame centre when `None`) and resizing it back to the original size.
///
/// The window is shifted to stay inside the frame. Factors `<= 1` and windows
/// that collapse to nothing leave the frame unchanged.
pub fn zoom_frame(frame: &Frame, zoom_factor: f64, center: Option<ZoomCenter>) -> Frame {
    if zoom_factor.is_nan() || zoom_factor <= 1.0 {
        return frame.clone();
    }
    let (width, height) = frame.dimensions();

    let (center_x, center_y) = match center {
        Some(c) => (
            (width as f64 * c.x_ratio) as i64,
            (height as f64 * c.y_ratio) as i64,
        ),
        None => ((width / 2) as i64, (height / 2) as i64),
    };

    let new_width = (width as f64 / zoom_factor) as i64;
    let new_height = (height as f64 / zoom_factor) as i64;
    if new_width <= 0 || new_height <= 0 {
        return frame.clone();
    }

    // --- Keep the crop window inside the frame ---
    let mut x = (center_x - new_width / 2).max(0);
    let mut y = (center_y - new_height / 2).max(0);
    if x + new_width > width as i64 {
        x = width as i64 - new_width;
    }
    if y + new_height > height as i64 {
        y = height as i64 - new_height;
    }
    let x = x.max(0) as u32;
    let y = y.max(0) as u32;
    let x2 = (x as i64 + new_width).min(width as i64) as u32;
    let y2 = (y as i64 + new_height).min(height as i64) as u32;

    let view = imageops::crop_imm(frame.buffer(), x, y, x2 - x, y2 - y);
    Frame::from_buffer(imageops::resize(
        &view.to_image(),
        width,
        height,
        FilterType::Triangle,
    ))
}

/// Zeroes every pixel of `mask` outside the `size x size` square centred on
/// `center`. The square is clamped to the image bounds.
pub fn mask_outside_square(mask: &mut GrayImage, center: Point, size: u32) {
    let half = size / 2;
    let (width, height) = mask.dimensions();

    let left = center.x.saturating_sub(half);
    let top = center.y.saturating_sub(half);
    let right = center.x.saturating_add(half).min(width);
    let bottom = center.y.saturating_add(half).min(height);

    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if x < left || x >= right || y < top || y >= bottom {
            pixel.0[0] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn striped_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _y in 0..height {
            for x in 0..width {
                let v = (x % 256) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::from_bgr(width, height, data).unwrap()
    }

    #[test]
    fn crop_to_aspect_ratio_normalises_wide_frames() {
        let frame = striped_frame(1280, 480);
        let out = crop_to_aspect_ratio(&frame, 640, 480);
        assert_eq!(out.dimensions(), (640, 480));
        // The centre 640 columns are kept 1:1, so column 0 comes from x = 320.
        assert_eq!(out.bgr_at(0, 10), [64, 64, 64]);
    }

    #[test]
    fn crop_to_aspect_ratio_normalises_tall_frames() {
        let frame = Frame::filled(480, 640, [9, 9, 9]).unwrap();
        let out = crop_to_aspect_ratio(&frame, 640, 480);
        assert_eq!(out.dimensions(), (640, 480));
        let value = out.bgr_at(320, 240)[1];
        assert!((8..=10).contains(&value));
    }

    #[test]
    fn crop_to_aspect_ratio_is_stable_on_second_application() {
        let frame = striped_frame(1920, 1080);
        let once = crop_to_aspect_ratio(&frame, 640, 480);
        let twice = crop_to_aspect_ratio(&once, 640, 480);
        assert_eq!(once, twice);
    }

    #[test]
    fn zoom_of_one_is_identity() {
        let frame = striped_frame(64, 48);
        assert_eq!(zoom_frame(&frame, 1.0, None), frame);
    }

    #[test]
    fn zoom_keeps_frame_size_and_clamps_window() {
        let frame = striped_frame(200, 100);
        // Centre pushed to the right edge: window must slide back inside.
        let out = zoom_frame(&frame, 2.0, Some(ZoomCenter::new(1.0, 0.5)));
        assert_eq!(out.dimensions(), (200, 100));
        // Window is x in [100, 200), so the left edge shows column ~100.
        let left = out.bgr_at(0, 50)[0];
        assert!((99..=101).contains(&left), "left edge came from column {left}");
    }

    #[test]
    fn mask_outside_square_clamps_to_bounds() {
        let mut mask = GrayImage::from_pixel(100, 100, Luma([255]));
        mask_outside_square(&mut mask, Point::new(10, 90), 40);
        assert_eq!(mask.get_pixel(0, 99).0[0], 255);
        assert_eq!(mask.get_pixel(29, 70).0[0], 255);
        assert_eq!(mask.get_pixel(30, 90).0[0], 0);
        assert_eq!(mask.get_pixel(10, 69).0[0], 0);
    }
}
