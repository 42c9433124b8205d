// THEORY:
// Calibration pins a reference pupil position. From then on every frame compares the
// current pupil centre against it, and the gate reports whether the eye is still
// within a circular tolerance around the reference. The gate is only meaningful
// after calibration: evaluating it without a lock is a usage error, never a silent
// "distance zero".

use crate::error::{CalibrationError, Result};

/// Binary output of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToleranceState {
    WithinTolerance,
    OutOfTolerance,
}

impl ToleranceState {
    pub fn is_within(self) -> bool {
        self == ToleranceState::WithinTolerance
    }
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Compares `current` against the locked centre. The boundary is inclusive:
/// a distance of exactly `radius` is still within tolerance.
pub fn evaluate(
    current: (f64, f64),
    locked: Option<(f64, f64)>,
    radius: f64,
) -> Result<ToleranceState> {
    let locked = locked.ok_or(CalibrationError::NotLocked)?;
    if distance(current, locked) <= radius {
        Ok(ToleranceState::WithinTolerance)
    } else {
        Ok(ToleranceState::OutOfTolerance)
    }
}

/// Calibrated reference position. The reference never moves on its own; only
/// `lock` and `unlock` change it. The tolerance radius stays in the config so the
/// gate always evaluates against the current setting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LockGate {
    locked: Option<(f64, f64)>,
}

impl LockGate {
    pub fn lock(&mut self, position: (f64, f64)) {
        self.locked = Some(position);
    }

    /// Clears the reference. Returns whether a lock was held.
    pub fn unlock(&mut self) -> bool {
        self.locked.take().is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn locked_position(&self) -> Option<(f64, f64)> {
        self.locked
    }

    pub fn evaluate(&self, current: (f64, f64), radius: f64) -> Result<ToleranceState> {
        evaluate(current, self.locked, radius)
    }

    /// Distance from the locked centre, or `None` while unlocked.
    pub fn distance_from_lock(&self, current: (f64, f64)) -> Option<f64> {
        self.locked.map(|locked| distance(current, locked))
    }
}
