// THEORY:
// Tracker settings come from a sectioned JSON file (`video`, `eye_tracking`). Every
// field has a default, so a missing file section, a missing key, or an empty object
// all yield a working tracker; sections this crate does not know about are ignored.
// Values are checked once with `validate` before a tracker is built, and the two
// settings an operator adjusts live (lock tolerance and zoom) have setters that run
// the same checks.

use crate::core_modules::contour_analyzer::AnalyzerParams;
use crate::core_modules::darkest_region::{BlockSumSearch, PowerMode, SearchWindow};
use crate::core_modules::geometry::ZoomCenter;
use crate::core_modules::threshold_bank::ThresholdOffsets;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Canonical working size every frame is cropped and resized to.
    pub working_width: u32,
    pub working_height: u32,
    pub zoom_factor: f64,
    /// Zoom centre as ratios of the frame size; frame centre when absent.
    pub zoom_center: Option<ZoomCenter>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            working_width: 640,
            working_height: 480,
            zoom_factor: 1.0,
            zoom_center: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeTrackingConfig {
    /// Lock tolerance radius in working-frame pixels.
    pub lockpos_threshold: f64,
    /// Relative margin a new threshold level must beat the current one by.
    pub threshold_switch_confidence_margin: f64,
    pub power_mode: PowerMode,
    pub threshold_offsets: ThresholdOffsets,
    /// Side of the square neighbourhood kept around the darkest point.
    pub mask_square_size: u32,
    pub min_contour_area: f64,
    pub max_aspect_ratio: f64,
}

impl Default for EyeTrackingConfig {
    fn default() -> Self {
        Self {
            lockpos_threshold: 48.0,
            threshold_switch_confidence_margin: 2.0,
            power_mode: PowerMode::Balanced,
            threshold_offsets: ThresholdOffsets::default(),
            mask_square_size: 250,
            min_contour_area: 1000.0,
            max_aspect_ratio: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub video: VideoConfig,
    pub eye_tracking: EyeTrackingConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_zoom(factor: f64, center: Option<ZoomCenter>) -> Result<(), ConfigError> {
    if factor.is_nan() || factor < 1.0 {
        return Err(invalid("video.zoom_factor", format!("must be >= 1, got {factor}")));
    }
    if let Some(center) = center {
        if !center.is_normalized() {
            return Err(invalid(
                "video.zoom_center",
                format!(
                    "ratios must lie in 0..1, got [{}, {}]",
                    center.x_ratio, center.y_ratio
                ),
            ));
        }
    }
    Ok(())
}

fn check_tolerance(radius: f64) -> Result<(), ConfigError> {
    if radius.is_nan() || radius < 0.0 {
        return Err(invalid(
            "eye_tracking.lockpos_threshold",
            format!("must be non-negative, got {radius}"),
        ));
    }
    Ok(())
}

impl TrackerConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let video = &self.video;
        if video.working_width == 0 || video.working_height == 0 {
            return Err(invalid(
                "video.working_width",
                format!(
                    "working size must be non-zero, got {}x{}",
                    video.working_width, video.working_height
                ),
            ));
        }
        check_zoom(video.zoom_factor, video.zoom_center)?;

        let eye = &self.eye_tracking;
        check_tolerance(eye.lockpos_threshold)?;
        let margin = eye.threshold_switch_confidence_margin;
        if margin.is_nan() || margin < 0.0 {
            return Err(invalid(
                "eye_tracking.threshold_switch_confidence_margin",
                format!("must be non-negative, got {margin}"),
            ));
        }
        let offsets = eye.threshold_offsets;
        if !(offsets.strict <= offsets.medium && offsets.medium <= offsets.relaxed) {
            return Err(invalid(
                "eye_tracking.threshold_offsets",
                format!(
                    "must satisfy strict <= medium <= relaxed, got {} / {} / {}",
                    offsets.strict, offsets.medium, offsets.relaxed
                ),
            ));
        }
        if eye.mask_square_size == 0 {
            return Err(invalid("eye_tracking.mask_square_size", "must be non-zero"));
        }
        if eye.min_contour_area.is_nan() || eye.min_contour_area < 0.0 {
            return Err(invalid(
                "eye_tracking.min_contour_area",
                format!("must be non-negative, got {}", eye.min_contour_area),
            ));
        }
        if eye.max_aspect_ratio.is_nan() || eye.max_aspect_ratio < 1.0 {
            return Err(invalid(
                "eye_tracking.max_aspect_ratio",
                format!("must be >= 1, got {}", eye.max_aspect_ratio),
            ));
        }
        Ok(())
    }

    pub fn set_lock_tolerance(&mut self, radius: f64) -> Result<(), ConfigError> {
        check_tolerance(radius)?;
        self.eye_tracking.lockpos_threshold = radius;
        Ok(())
    }

    pub fn set_zoom(&mut self, factor: f64, center: Option<ZoomCenter>) -> Result<(), ConfigError> {
        check_zoom(factor, center)?;
        self.video.zoom_factor = factor;
        self.video.zoom_center = center;
        Ok(())
    }

    pub fn analyzer_params(&self) -> AnalyzerParams {
        AnalyzerParams {
            min_area: self.eye_tracking.min_contour_area,
            max_aspect_ratio: self.eye_tracking.max_aspect_ratio,
            ..AnalyzerParams::default()
        }
    }

    pub fn darkest_region_search(&self) -> BlockSumSearch {
        BlockSumSearch::new(SearchWindow::default(), self.eye_tracking.power_mode)
    }
}
