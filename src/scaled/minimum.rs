//! Policies for deriving a range timer's minimum from its maximum.

use crate::types::ScaleFactor;
use std::fmt;
use std::time::Duration;

/// How to compute the minimum of a `[min, max]` window given the maximum.
///
/// Callers configuring adaptive timeouts usually know the maximum (the
/// unloaded timeout) and express the floor either as a fraction of it or
/// as a fixed duration.
#[derive(Clone, Copy, PartialEq)]
pub enum TimerMinimum {
    /// The minimum is `factor * max`.
    ScaledBy(ScaleFactor),
    /// The minimum is a fixed duration, independent of the maximum.
    Absolute(Duration),
}

impl TimerMinimum {
    /// Computes the effective minimum for the given maximum.
    ///
    /// An absolute minimum is returned as-is, even when it exceeds `max`;
    /// arming with it collapses the window to `[min, min]`.
    #[must_use]
    pub fn compute_min(&self, max: Duration) -> Duration {
        match self {
            Self::ScaledBy(factor) => max.mul_f64(f64::from(factor.value())),
            Self::Absolute(value) => *value,
        }
    }
}

impl fmt::Debug for TimerMinimum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaledBy(factor) => write!(f, "TimerMinimum::ScaledBy({})", factor.value()),
            Self::Absolute(value) => write!(f, "TimerMinimum::Absolute({value:?})"),
        }
    }
}
