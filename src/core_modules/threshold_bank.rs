// THEORY:
// The threshold bank turns one grayscale frame into three candidate pupil masks.
// Starting from the intensity of the darkest pixel, each level admits every pixel
// that is at most `offset` grey levels brighter. Strict masks hug the pupil core
// and fail under uneven lighting; relaxed masks survive glare but bleed into lashes
// and shadows. Rather than guessing, the tracker builds all three every frame and
// lets the contour analyzer score them.
//
// Every mask is also cut down to a square neighbourhood around the darkest point,
// so that dark regions elsewhere in the frame (eyebrows, hair, frame corners) cannot
// compete with the pupil.

use crate::core_modules::frame::Point;
use crate::core_modules::geometry::mask_outside_square;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

pub const LEVEL_COUNT: usize = 3;

/// One of the three mask strictness settings. The discriminant is the level's
/// index in per-frame arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdLevel {
    Strict = 0,
    Medium = 1,
    Relaxed = 2,
}

impl ThresholdLevel {
    pub const ALL: [ThresholdLevel; LEVEL_COUNT] = [
        ThresholdLevel::Strict,
        ThresholdLevel::Medium,
        ThresholdLevel::Relaxed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Intensity offsets added to the darkest pixel value for each level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOffsets {
    pub strict: u8,
    pub medium: u8,
    pub relaxed: u8,
}

impl Default for ThresholdOffsets {
    fn default() -> Self {
        Self {
            strict: 5,
            medium: 15,
            relaxed: 25,
        }
    }
}

impl ThresholdOffsets {
    pub fn offset(&self, level: ThresholdLevel) -> u8 {
        match level {
            ThresholdLevel::Strict => self.strict,
            ThresholdLevel::Medium => self.medium,
            ThresholdLevel::Relaxed => self.relaxed,
        }
    }
}

/// The three masks of one frame, indexed by `ThresholdLevel`.
#[derive(Debug, Clone)]
pub struct MaskSet {
    masks: [GrayImage; LEVEL_COUNT],
}

impl MaskSet {
    pub fn get(&self, level: ThresholdLevel) -> &GrayImage {
        &self.masks[level.index()]
    }
}

/// Inverse binary threshold: pixels `<= threshold` become 255, the rest 0.
pub fn apply_inverse_threshold(gray: &GrayImage, threshold: u16) -> GrayImage {
    let mut mask = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(mask.pixels_mut()) {
        *dst = if (src.0[0] as u16) <= threshold {
            Luma([255])
        } else {
            Luma([0])
        };
    }
    mask
}

/// Builds the strict, medium and relaxed masks around `darkest_point`.
pub fn build_masks(
    gray: &GrayImage,
    darkest_point: Point,
    offsets: &ThresholdOffsets,
    square_size: u32,
) -> MaskSet {
    let darkest_value = gray.get_pixel(darkest_point.x, darkest_point.y).0[0] as u16;

    let masks = ThresholdLevel::ALL.map(|level| {
        let threshold = darkest_value + offsets.offset(level) as u16;
        let mut mask = apply_inverse_threshold(gray, threshold);
        mask_outside_square(&mut mask, darkest_point, square_size);
        mask
    });

    MaskSet { masks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_round_trip_through_indices() {
        for level in ThresholdLevel::ALL {
            assert_eq!(ThresholdLevel::from_index(level.index()), Some(level));
        }
        assert_eq!(ThresholdLevel::from_index(3), None);
    }

    #[test]
    fn inverse_threshold_is_inclusive() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[19u8, 20, 21][x as usize]]));
        let mask = apply_inverse_threshold(&gray, 20);
        assert_eq!(mask.as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn masks_grow_with_offset_and_stay_inside_square() {
        // Horizontal gradient: value = x / 2, darkest at the left edge.
        let gray = GrayImage::from_fn(400, 100, |x, _| Luma([(x / 2).min(255) as u8]));
        let masks = build_masks(&gray, Point::new(0, 50), &ThresholdOffsets::default(), 250);

        let white = |m: &GrayImage| m.pixels().filter(|p| p.0[0] == 255).count();
        let strict = white(masks.get(ThresholdLevel::Strict));
        let medium = white(masks.get(ThresholdLevel::Medium));
        let relaxed = white(masks.get(ThresholdLevel::Relaxed));
        assert!(strict < medium && medium < relaxed);

        // Strict admits value <= 5, i.e. x <= 11: 12 columns x 100 rows.
        assert_eq!(strict, 12 * 100);
        // Everything right of the square (x >= 125) is cleared.
        assert!(masks
            .get(ThresholdLevel::Relaxed)
            .enumerate_pixels()
            .all(|(x, _, p)| x < 125 || p.0[0] == 0));
    }

    #[test]
    fn thresholds_saturate_above_white() {
        let gray = GrayImage::from_pixel(10, 10, Luma([250]));
        let masks = build_masks(&gray, Point::new(5, 5), &ThresholdOffsets::default(), 250);
        assert!(masks.get(ThresholdLevel::Strict).pixels().all(|p| p.0[0] == 255));
    }
}
