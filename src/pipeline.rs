// THEORY:
// The `pipeline` module is the top-level API of the tracker. One call to
// `track_frame` takes a raw camera frame through every stage:
//
//   crop/zoom -> darkest region -> threshold bank -> contour analysis (x3)
//   -> threshold selection -> contour refinement -> ellipse fit -> lock gate
//   -> annotation
//
// Everything created along the way is dropped at the end of the call. The only
// thing that survives between frames is the `TrackingState`, which `track_frame`
// mutates in place: the threshold level trusted last frame, the calibration lock,
// the last tolerance verdict and the last acknowledged actuator command. Frames
// must therefore be fed strictly in order, one at a time.
//
// "Nothing found" is an ordinary outcome at every stage. It shows up as `None`
// fields in the `FrameReport`, and the state carries over untouched.

use crate::config::TrackerConfig;
use crate::core_modules::annotate::{
    draw_ellipse, draw_pupil_center, tolerance_color, ELLIPSE_THICKNESS, UNLOCKED_ELLIPSE_COLOR,
};
use crate::core_modules::command::{Actuator, CommandGate, SendOutcome};
use crate::core_modules::contour_analyzer::{analyze, ContourAnalysis};
use crate::core_modules::contour_refiner::refine;
use crate::core_modules::darkest_region::DarkestRegionSearch;
use crate::core_modules::ellipse::{fit_ellipse, MIN_FIT_POINTS};
use crate::core_modules::geometry::{crop_to_aspect_ratio, zoom_frame};
use crate::core_modules::lock_gate::{LockGate, ToleranceState};
use crate::core_modules::threshold_bank::{build_masks, LEVEL_COUNT};
use crate::core_modules::threshold_selector::select_threshold;
use crate::error::{CalibrationError, Result};
use log::{debug, info, warn};

// Re-export the data structures that appear in reports.
pub use crate::core_modules::ellipse::Ellipse;
pub use crate::core_modules::frame::{Frame, Point};
pub use crate::core_modules::geometry::ZoomCenter;
pub use crate::core_modules::threshold_bank::ThresholdLevel;

/// State carried from one frame to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    /// Index of the threshold level trusted on the last frame.
    pub prev_threshold_index: usize,
    /// Calibrated reference centre.
    pub lock: LockGate,
    /// Last tolerance verdict. Only meaningful while locked.
    pub is_within_threshold: bool,
    /// Pupil centre of the most recent frame that had one.
    pub last_pupil_center: Option<(f64, f64)>,
    pub command_gate: CommandGate,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            prev_threshold_index: ThresholdLevel::Medium.index(),
            lock: LockGate::default(),
            is_within_threshold: true,
            last_pupil_center: None,
            command_gate: CommandGate::default(),
        }
    }
}

impl TrackingState {
    pub fn is_position_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// The threshold level trusted on the last frame.
    pub fn threshold_level(&self) -> ThresholdLevel {
        ThresholdLevel::from_index(self.prev_threshold_index).unwrap_or(ThresholdLevel::Medium)
    }
}

/// Everything the tracker learned from one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// The cropped, zoomed and annotated working frame.
    pub frame: Frame,
    pub darkest_point: Option<Point>,
    /// Centre of the refined ellipse, or the darkest point when no ellipse fitted.
    pub pupil_center: Option<(f64, f64)>,
    /// Ellipse fitted to the refined contour.
    pub ellipse: Option<Ellipse>,
    /// Ellipse fitted to the selected contour before refinement.
    pub selected_ellipse: Option<Ellipse>,
    pub threshold_level: ThresholdLevel,
    pub level_scores: [f64; LEVEL_COUNT],
    pub threshold_switched: bool,
    /// Gate verdict; `None` when unlocked or when no ellipse was found.
    pub tolerance: Option<ToleranceState>,
    pub distance_from_lock: Option<f64>,
    /// Result of the actuator send triggered by this frame, if any.
    pub command_outcome: Option<SendOutcome>,
}

impl FrameReport {
    fn empty(frame: Frame, state: &TrackingState) -> Self {
        Self {
            frame,
            darkest_point: None,
            pupil_center: None,
            ellipse: None,
            selected_ellipse: None,
            threshold_level: state.threshold_level(),
            level_scores: [0.0; LEVEL_COUNT],
            threshold_switched: false,
            tolerance: None,
            distance_from_lock: None,
            command_outcome: None,
        }
    }
}

/// Normalises a raw frame to the working size and applies the configured zoom.
pub fn prepare_frame(frame: &Frame, config: &TrackerConfig) -> Frame {
    let video = &config.video;
    let working = crop_to_aspect_ratio(frame, video.working_width, video.working_height);
    if video.zoom_factor > 1.0 {
        zoom_frame(&working, video.zoom_factor, video.zoom_center)
    } else {
        working
    }
}

/// Runs the full pipeline on one frame and updates `state`.
pub fn track_frame(
    frame: &Frame,
    config: &TrackerConfig,
    state: &mut TrackingState,
) -> Result<FrameReport> {
    // Stage 1: Geometry
    let mut working = prepare_frame(frame, config);
    let gray = working.to_gray();

    // Stage 2: Seed point
    let Some(darkest) = config.darkest_region_search().locate(&gray) else {
        debug!("No darkest region in frame; state carried over");
        return Ok(FrameReport::empty(working, state));
    };
    debug!("Darkest point at ({}, {})", darkest.x, darkest.y);

    // Stage 3: Candidate masks and their analyses
    let eye = &config.eye_tracking;
    let masks = build_masks(&gray, darkest, &eye.threshold_offsets, eye.mask_square_size);
    let params = config.analyzer_params();
    let analyses: [Option<ContourAnalysis>; LEVEL_COUNT] =
        ThresholdLevel::ALL.map(|level| analyze(masks.get(level), &params));
    let scores = analyses
        .each_ref()
        .map(|analysis| analysis.as_ref().map_or(0.0, |a| a.score));
    debug!(
        "Level scores: strict {:.1}, medium {:.1}, relaxed {:.1}",
        scores[0], scores[1], scores[2]
    );

    // Stage 4: Hysteresis over levels
    let mut threshold_switched = false;
    if analyses.iter().any(Option::is_some) {
        let prev = state.prev_threshold_index;
        let next = select_threshold(prev, &scores, eye.threshold_switch_confidence_margin);
        if next != prev {
            info!(
                "Switched threshold level {:?} -> {:?} (score {:.1} -> {:.1})",
                state.threshold_level(),
                ThresholdLevel::from_index(next).unwrap_or(ThresholdLevel::Medium),
                scores.get(prev).copied().unwrap_or(0.0),
                scores[next]
            );
            state.prev_threshold_index = next;
            threshold_switched = true;
        }
    }
    let selected = analyses
        .get(state.prev_threshold_index)
        .and_then(Option::as_ref);

    // Stage 5: Refinement and final fit
    let ellipse = selected.and_then(|analysis| {
        let refined = refine(&analysis.contour);
        if refined.len() < MIN_FIT_POINTS {
            return None;
        }
        fit_ellipse(&refined.to_f64_points())
    });
    let pupil_center = ellipse.map_or(darkest.as_f64(), |e| e.center());
    state.last_pupil_center = Some(pupil_center);

    // Stage 6: Lock gate
    let mut tolerance = None;
    let mut distance_from_lock = None;
    if let Some(analysis) = selected.filter(|_| state.lock.is_locked()) {
        let verdict = state.lock.evaluate(pupil_center, eye.lockpos_threshold)?;
        if verdict.is_within() != state.is_within_threshold {
            info!("Pupil moved {:?}", verdict);
        }
        state.is_within_threshold = verdict.is_within();
        tolerance = Some(verdict);
        distance_from_lock = state.lock.distance_from_lock(pupil_center);
        draw_ellipse(&mut working, &analysis.ellipse, tolerance_color(verdict), ELLIPSE_THICKNESS);
    }

    // Stage 7: Annotation
    if let Some(ellipse) = &ellipse {
        draw_pupil_center(&mut working, ellipse.center());
        if !state.is_position_locked() {
            draw_ellipse(&mut working, ellipse, UNLOCKED_ELLIPSE_COLOR, ELLIPSE_THICKNESS);
        }
    }

    Ok(FrameReport {
        frame: working,
        darkest_point: Some(darkest),
        pupil_center: Some(pupil_center),
        ellipse,
        selected_ellipse: selected.map(|analysis| analysis.ellipse),
        threshold_level: state.threshold_level(),
        level_scores: scores,
        threshold_switched,
        tolerance,
        distance_from_lock,
        command_outcome: None,
    })
}

/// The main, top-level struct of the tracker: configuration, cross-frame state and
/// an optional actuator fed with tolerance transitions.
pub struct PupilTracker {
    config: TrackerConfig,
    state: TrackingState,
    /// Frames processed since `state.last_pupil_center` was last refreshed.
    frames_since_pupil: u64,
    actuator: Option<Box<dyn Actuator + Send>>,
}

impl Default for PupilTracker {
    fn default() -> Self {
        Self {
            config: TrackerConfig::default(),
            state: TrackingState::default(),
            frames_since_pupil: 0,
            actuator: None,
        }
    }
}

impl PupilTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: TrackingState::default(),
            frames_since_pupil: 0,
            actuator: None,
        })
    }

    pub fn with_actuator(mut self, actuator: Box<dyn Actuator + Send>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        let mut report = track_frame(frame, &self.config, &mut self.state)?;
        if report.pupil_center.is_some() {
            self.frames_since_pupil = 0;
        } else {
            self.frames_since_pupil += 1;
        }
        if let (Some(verdict), Some(actuator)) = (report.tolerance, self.actuator.as_deref_mut()) {
            report.command_outcome = self.state.command_gate.dispatch(verdict, actuator);
        }
        Ok(report)
    }

    /// Pins the lock reference to the most recent pupil centre.
    pub fn lock_current_position(&mut self) -> Result<(f64, f64)> {
        let Some(position) = self.state.last_pupil_center else {
            warn!("Lock requested before any pupil position was observed");
            return Err(CalibrationError::NoPupilPosition.into());
        };
        if self.frames_since_pupil > 0 {
            warn!(
                "Locking to a pupil position last seen {} frame(s) ago",
                self.frames_since_pupil
            );
        }
        info!("Locked pupil position at ({:.1}, {:.1})", position.0, position.1);
        self.state.lock.lock(position);
        Ok(position)
    }

    pub fn unlock(&mut self) {
        if self.state.lock.unlock() {
            info!("Unlocked pupil position");
        }
    }

    /// True only while locked and the last gated frame was within tolerance.
    pub fn is_eye_in_position(&self) -> bool {
        self.state.is_position_locked() && self.state.is_within_threshold
    }

    pub fn set_lock_tolerance(&mut self, radius: f64) -> Result<()> {
        self.config.set_lock_tolerance(radius)?;
        Ok(())
    }

    pub fn set_zoom(&mut self, factor: f64, center: Option<ZoomCenter>) -> Result<()> {
        self.config.set_zoom(factor, center)?;
        Ok(())
    }

    /// Frames since the last pupil centre was observed, or `None` before the
    /// first one.
    pub fn pupil_center_age(&self) -> Option<u64> {
        self.state.last_pupil_center.map(|_| self.frames_since_pupil)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }
}
