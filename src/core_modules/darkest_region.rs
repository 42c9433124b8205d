// THEORY:
// The darkest-region search seeds the whole pipeline. In a close-up eye image the
// pupil is the darkest sizeable feature, so the centre of the darkest block is a
// good first guess for "somewhere inside the pupil".
//
// The search walks a coarse grid of block origins (every `stride` pixels, keeping a
// margin of `ignore_bounds` away from the borders) and, for every block, sums a
// sparse `internal_stride`-spaced sample of its pixels. The block with the smallest
// sum wins; on equal sums the first block in row-major order is kept. The returned
// point is the block centre. When every block sums to the same value the image is
// flat and there is nothing to seed from.
//
// There is exactly one search strategy (`BlockSumSearch`). `PowerMode` only decides
// whether the candidate rows are scanned on one thread or split across the rayon
// pool; the reduction is ordered, so both modes return the same point for the same
// image. A grid smaller than `PARALLEL_MIN_BLOCKS`, or a single-core host, is always
// scanned sequentially: below that size dispatching the row chunks costs more than
// it saves.

use crate::core_modules::frame::Point;
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy seam for locating the pupil seed point in a grayscale image.
pub trait DarkestRegionSearch {
    /// Returns the centre of the darkest block, or `None` when the image is too
    /// small for the configured margins or has no darker region at all.
    fn locate(&self, gray: &GrayImage) -> Option<Point>;
}

/// Performance knob for the darkest-region search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    /// Single-threaded scan.
    #[default]
    Balanced,
    /// Candidate rows are split across all logical cores once the grid is
    /// large enough (see [`PARALLEL_MIN_BLOCKS`]).
    Performance,
}

/// Geometry of the block search grid, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Margin kept clear of every image border.
    pub ignore_bounds: u32,
    /// Side length of each summed block.
    pub search_area: u32,
    /// Distance between neighbouring block origins.
    pub stride: u32,
    /// Sampling step inside a block.
    pub internal_stride: u32,
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self {
            ignore_bounds: 20,
            search_area: 20,
            stride: 10,
            internal_stride: 5,
        }
    }
}

/// Smallest candidate grid (rows x columns) worth splitting across threads.
pub const PARALLEL_MIN_BLOCKS: usize = 1024;

/// Best block seen so far: (sample sum, row index, column index).
type Candidate = (u64, usize, usize);

/// Sampled block-sum search over a strided grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockSumSearch {
    pub window: SearchWindow,
    pub power_mode: PowerMode,
}

impl BlockSumSearch {
    pub fn new(window: SearchWindow, power_mode: PowerMode) -> Self {
        Self { window, power_mode }
    }

    /// Block origins along one axis of length `extent`.
    fn origins(&self, extent: u32) -> Vec<u32> {
        let start = self.window.ignore_bounds;
        let reserved = self
            .window
            .ignore_bounds
            .saturating_add(self.window.search_area);
        match extent.checked_sub(reserved) {
            Some(end) if end > start => (start..end)
                .step_by(self.window.stride.max(1) as usize)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn block_sum(&self, gray: &GrayImage, x: u32, y: u32) -> u64 {
        let step = self.window.internal_stride.max(1) as usize;
        let (width, height) = gray.dimensions();
        let mut sum = 0u64;
        for dy in (0..self.window.search_area).step_by(step) {
            if y + dy >= height {
                break;
            }
            for dx in (0..self.window.search_area).step_by(step) {
                if x + dx >= width {
                    break;
                }
                sum += gray.get_pixel(x + dx, y + dy).0[0] as u64;
            }
        }
        sum
    }

    /// Scans rows `row_offset..row_offset + rows.len()` of the candidate grid and
    /// returns the darkest block together with the brightest block sum.
    fn scan(
        &self,
        gray: &GrayImage,
        rows: &[u32],
        row_offset: usize,
        cols: &[u32],
    ) -> Option<(Candidate, u64)> {
        let mut best: Option<Candidate> = None;
        let mut brightest = 0u64;
        for (i, &y) in rows.iter().enumerate() {
            for (j, &x) in cols.iter().enumerate() {
                let sum = self.block_sum(gray, x, y);
                brightest = brightest.max(sum);
                if best.is_none_or(|(best_sum, _, _)| sum < best_sum) {
                    best = Some((sum, row_offset + i, j));
                }
            }
        }
        best.map(|candidate| (candidate, brightest))
    }

    fn scan_parallel(
        &self,
        gray: &GrayImage,
        rows: &[u32],
        cols: &[u32],
    ) -> Option<(Candidate, u64)> {
        let workers = num_cpus::get();
        if workers < 2 || rows.len() * cols.len() < PARALLEL_MIN_BLOCKS {
            return self.scan(gray, rows, 0, cols);
        }
        let rows_per_worker = rows.len().div_ceil(workers).max(1);

        // Ordered reduction: lowest sum, then earliest row, then earliest column.
        rows.par_chunks(rows_per_worker)
            .enumerate()
            .filter_map(|(k, chunk)| self.scan(gray, chunk, k * rows_per_worker, cols))
            .reduce_with(|(best_a, max_a), (best_b, max_b)| {
                (best_a.min(best_b), max_a.max(max_b))
            })
    }
}

impl DarkestRegionSearch for BlockSumSearch {
    fn locate(&self, gray: &GrayImage) -> Option<Point> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let rows = self.origins(height);
        let cols = self.origins(width);
        if rows.is_empty() || cols.is_empty() {
            return None;
        }

        let ((darkest, i, j), brightest) = match self.power_mode {
            PowerMode::Balanced => self.scan(gray, &rows, 0, &cols),
            PowerMode::Performance => self.scan_parallel(gray, &rows, &cols),
        }?;

        // A flat image has no dark region to seed from.
        if darkest == brightest {
            return None;
        }

        let half = self.window.search_area / 2;
        Some(Point::new(cols[j] + half, rows[i] + half))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bright_with_dark_square(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                Luma([10])
            } else {
                Luma([200])
            }
        })
    }

    #[test]
    fn finds_dark_square_within_one_stride() {
        let gray = bright_with_dark_square(640, 480, 305, 205, 40);
        let search = BlockSumSearch::default();
        let point = search.locate(&gray).expect("dark square should be found");

        let (true_x, true_y) = (325i64, 225i64);
        let stride = search.window.stride as i64;
        assert!((point.x as i64 - true_x).abs() <= stride, "x = {}", point.x);
        assert!((point.y as i64 - true_y).abs() <= stride, "y = {}", point.y);
        // First fully dark block in row-major order.
        assert_eq!(point, Point::new(320, 220));
    }

    #[test]
    fn power_modes_agree() {
        for (x0, y0) in [(30, 30), (305, 205), (580, 400), (100, 420)] {
            let gray = bright_with_dark_square(640, 480, x0, y0, 30);
            let balanced = BlockSumSearch::new(SearchWindow::default(), PowerMode::Balanced);
            let performance = BlockSumSearch::new(SearchWindow::default(), PowerMode::Performance);
            assert_eq!(balanced.locate(&gray), performance.locate(&gray));
        }
    }

    #[test]
    fn power_modes_agree_on_grids_large_enough_to_split() {
        let search = BlockSumSearch::default();
        let rows = search.origins(1080).len();
        let cols = search.origins(1920).len();
        assert!(rows * cols >= PARALLEL_MIN_BLOCKS);

        for (x0, y0) in [(25, 25), (940, 520), (1850, 1010)] {
            let gray = bright_with_dark_square(1920, 1080, x0, y0, 40);
            let balanced = BlockSumSearch::new(SearchWindow::default(), PowerMode::Balanced);
            let performance = BlockSumSearch::new(SearchWindow::default(), PowerMode::Performance);
            assert_eq!(balanced.locate(&gray), performance.locate(&gray));
        }
    }

    #[test]
    fn flat_images_have_no_darkest_region() {
        for value in [0u8, 128, 255] {
            let gray = GrayImage::from_pixel(200, 200, Luma([value]));
            assert_eq!(BlockSumSearch::default().locate(&gray), None);
        }
    }

    #[test]
    fn equal_dark_blocks_resolve_to_the_first_in_row_major_order() {
        let gray = GrayImage::from_fn(200, 200, |x, y| {
            if (x >= 100 && y >= 40 && y < 80) || (x < 60 && y >= 120) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let point = BlockSumSearch::default().locate(&gray);
        assert_eq!(point, Some(Point::new(110, 50)));
    }

    #[test]
    fn too_small_or_empty_images_yield_none() {
        let search = BlockSumSearch::default();
        let with_dot = |side: u32| {
            GrayImage::from_fn(side, side, |x, y| {
                if x == 20 && y == 20 { Luma([0]) } else { Luma([90]) }
            })
        };
        assert_eq!(search.locate(&GrayImage::new(0, 0)), None);
        assert_eq!(search.locate(&with_dot(60)), None);
        assert_eq!(search.locate(&with_dot(71)), Some(Point::new(30, 30)));
    }
}
