// THEORY:
// This file is the entry point of the `pupil_gate` library crate. It exposes the
// `PupilTracker` (and the `track_frame` function underneath it) as the high-level
// interface: feed it camera frames, read back the pupil centre, the fitted ellipse
// and the lock verdict. `parallel_pipeline` wraps the same tracker in an async
// worker for callers that acquire frames concurrently.
//
// The per-stage algorithms live in `core_modules` and stay public so that tools and
// tests can drive individual stages, but a typical consumer only needs `pipeline`
// and `config`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{EyeTrackingConfig, TrackerConfig, VideoConfig};
pub use error::{CalibrationError, ConfigError, Result, TrackerError};
pub use pipeline::{track_frame, FrameReport, PupilTracker, TrackingState};
