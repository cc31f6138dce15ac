//! Manager configuration.
//!
//! Configuration is normalized, never rejected: out-of-range values are
//! clamped to something safe so construction stays infallible.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `initial_scale_factor` | `1.0` (no compression) |
//! | `max_timer_duration` | ~146 years (half the signed nanosecond range) |

use crate::types::ScaleFactor;
use std::time::Duration;

/// Longest `max` a timer may be armed with; anything above is clamped.
const MAX_TIMER_DURATION: Duration = Duration::from_nanos((i64::MAX / 2) as u64);

/// Configuration for a [`ScaledRangeTimerManager`].
///
/// [`ScaledRangeTimerManager`]: crate::scaled::ScaledRangeTimerManager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Scale factor applied at construction; clamped to `[0, 1]`.
    pub initial_scale_factor: f32,
    /// Upper bound on a timer's `max` duration. Longer arms are clamped
    /// down to this, never rejected.
    pub max_timer_duration: Duration,
}

impl ManagerConfig {
    /// Normalize configuration values to safe ranges.
    pub fn normalize(&mut self) {
        self.initial_scale_factor = ScaleFactor::new(self.initial_scale_factor).value();
        if self.max_timer_duration > MAX_TIMER_DURATION {
            self.max_timer_duration = MAX_TIMER_DURATION;
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            initial_scale_factor: 1.0,
            max_timer_duration: MAX_TIMER_DURATION,
        }
    }
}
