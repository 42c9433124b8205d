// THEORY:
// The `error` module gathers every hard failure the tracker can report. Ordinary
// "nothing found this frame" outcomes never show up here: those are `Option`s that
// flow through the pipeline. What remains are three families:
// 1.  **Precondition violations**: a frame buffer that is empty or does not match
//     its declared dimensions.
// 2.  **Calibration misuse**: asking for a lock before a pupil position exists, or
//     evaluating the gate without a lock. These are kept apart from "pupil not
//     found" so the driver can tell the two situations apart.
// 3.  **Configuration problems**: unreadable, unparsable or out-of-range settings.

use thiserror::Error;

/// Misuse of the calibration lock.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A lock was requested before any frame produced a pupil position.
    #[error("cannot lock position: no pupil position has been observed yet")]
    NoPupilPosition,
    /// The tolerance gate was evaluated without a locked reference position.
    #[error("pupil position is not calibrated")]
    NotLocked,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("frame is empty (width {width}, height {height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected} for its dimensions")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tracking worker has shut down")]
    WorkerClosed,
}

impl TrackerError {
    /// True for the "not calibrated" family, as opposed to frame or config errors.
    pub fn is_calibration(&self) -> bool {
        matches!(self, TrackerError::Calibration(_))
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_errors_are_distinguishable() {
        let err: TrackerError = CalibrationError::NotLocked.into();
        assert!(err.is_calibration());
        assert!(!TrackerError::EmptyFrame { width: 0, height: 0 }.is_calibration());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = TrackerError::BufferSizeMismatch { expected: 12, actual: 3 };
        assert_eq!(
            err.to_string(),
            "frame buffer holds 3 bytes, expected 12 for its dimensions"
        );
        let err: TrackerError = CalibrationError::NoPupilPosition.into();
        assert!(err.to_string().contains("no pupil position"));
    }
}
