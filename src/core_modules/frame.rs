// THEORY:
// The `Frame` is the raw input of the tracker: one colour image per tick, stored
// as interleaved 8-bit channels in B, G, R order (the order camera stacks hand us).
// Internally the bytes live in an `image::RgbImage`, used purely as a 3-channel
// container; the channel names of `Rgb` do not apply, every helper here knows the
// real order is BGR.
//
// A `Frame` is a "dumb" data container. It validates its buffer once at
// construction, and from then on the rest of the pipeline can assume a non-empty,
// correctly sized image.

use crate::error::{Result, TrackerError};
use image::{GrayImage, Luma, Rgb, RgbImage};

/// A pixel coordinate in frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn as_f64(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

/// A colour frame in BGR channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Wraps an interleaved BGR byte buffer of `width * height * 3` bytes.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TrackerError::EmptyFrame { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(TrackerError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let buffer = RgbImage::from_raw(width, height, data).ok_or(
            TrackerError::BufferSizeMismatch {
                expected,
                actual: 0,
            },
        )?;
        Ok(Self { buffer })
    }

    /// Builds a frame from a decoded RGB image, swapping it into BGR order.
    pub fn from_rgb_image(image: &RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TrackerError::EmptyFrame {
                width: image.width(),
                height: image.height(),
            });
        }
        let mut buffer = image.clone();
        for pixel in buffer.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        Ok(Self { buffer })
    }

    /// A frame filled with one BGR colour.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TrackerError::EmptyFrame { width, height });
        }
        Ok(Self {
            buffer: RgbImage::from_pixel(width, height, Rgb(bgr)),
        })
    }

    /// Wraps a buffer already produced by a frame transform. Only used on
    /// buffers derived from a valid frame, so it never sees an empty image.
    pub(crate) fn from_buffer(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// BGR value at `(x, y)`.
    pub fn bgr_at(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub(crate) fn buffer(&self) -> &RgbImage {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Luma conversion with Rec. 601 weights applied to the BGR channels.
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        let mut gray = GrayImage::new(width, height);
        for (x, y, pixel) in self.buffer.enumerate_pixels() {
            let [b, g, r] = pixel.0;
            let luma = 0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32;
            gray.put_pixel(x, y, Luma([luma.round().min(255.0) as u8]));
        }
        gray
    }

    /// Converts back to RGB order, e.g. for encoding with the `image` crate.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut rgb = self.buffer.clone();
        for pixel in rgb.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_truncated_buffers() {
        assert!(matches!(
            Frame::from_bgr(0, 10, Vec::new()),
            Err(TrackerError::EmptyFrame { width: 0, height: 10 })
        ));
        assert!(matches!(
            Frame::from_bgr(2, 2, vec![0; 11]),
            Err(TrackerError::BufferSizeMismatch {
                expected: 12,
                actual: 11
            })
        ));
    }

    #[test]
    fn gray_conversion_weights_bgr_channels() {
        // Pure blue, pure green, pure red.
        let data = vec![255, 0, 0, 0, 255, 0, 0, 0, 255];
        let frame = Frame::from_bgr(3, 1, data).unwrap();
        let gray = frame.to_gray();
        assert_eq!(gray.get_pixel(0, 0).0[0], 29);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 76);
    }

    #[test]
    fn rgb_round_trip_swaps_channels() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&rgb).unwrap();
        assert_eq!(frame.bgr_at(1, 1), [30, 20, 10]);
        assert_eq!(frame.to_rgb_image(), rgb);
    }
}
