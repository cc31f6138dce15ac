//! Monotonic instants and signed time spans.
//!
//! The whole crate computes in integer nanoseconds. [`MonotonicTime`] is an
//! instant on a non-decreasing clock with an arbitrary epoch; subtracting two
//! instants yields a [`TimeDelta`], a signed span good for roughly ±292
//! years. Public APIs accept `std::time::Duration` and convert at the
//! boundary, saturating instead of wrapping.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Converts a `Duration` to nanoseconds, saturating at `u64::MAX`.
fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// An instant on a monotonic, non-decreasing clock.
///
/// The epoch is arbitrary (typically the creation of the time source), so
/// instants are only meaningful relative to one another.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonotonicTime(u64);

impl MonotonicTime {
    /// The epoch instant.
    pub const ZERO: Self = Self(0);

    /// Creates an instant from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates an instant from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates an instant from seconds since the epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the instant as nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Adds a `Duration`, saturating at the representable maximum.
    #[must_use]
    pub fn saturating_add_duration(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_to_nanos(duration)))
    }
}

impl Add<Duration> for MonotonicTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add_duration(rhs)
    }
}

impl Sub for MonotonicTime {
    type Output = TimeDelta;

    /// Signed difference between two instants, saturating at the
    /// `TimeDelta` range limits.
    fn sub(self, rhs: Self) -> TimeDelta {
        let diff = i128::from(self.0) - i128::from(rhs.0);
        TimeDelta(diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

impl fmt::Debug for MonotonicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MonotonicTime({}ns)", self.0)
    }
}

impl fmt::Display for MonotonicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(
                f,
                "{}.{:03}s",
                self.0 / 1_000_000_000,
                (self.0 / 1_000_000) % 1000
            )
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 >= 1_000 {
            write!(f, "{}us", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

/// A signed span of time in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeDelta(i64);

impl TimeDelta {
    /// The empty span.
    pub const ZERO: Self = Self(0);

    /// The longest representable span.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a span from a nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a span from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a span from seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Creates a non-negative span from a `Duration`, saturating at
    /// [`TimeDelta::MAX`].
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.as_nanos().min(i64::MAX as u128) as i64)
    }

    /// Returns the span as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns true for spans shorter than zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Clamps the span to be non-negative.
    #[must_use]
    pub const fn max_zero(self) -> Self {
        if self.0 < 0 {
            Self::ZERO
        } else {
            self
        }
    }

    /// Converts to a `Duration`, treating negative spans as zero.
    #[must_use]
    pub const fn to_duration(self) -> Duration {
        if self.0 <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.0 as u64)
        }
    }
}

impl fmt::Debug for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeDelta({}ns)", self.0)
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        if magnitude >= 1_000_000_000 {
            write!(
                f,
                "{sign}{}.{:03}s",
                magnitude / 1_000_000_000,
                (magnitude / 1_000_000) % 1000
            )
        } else if magnitude >= 1_000_000 {
            write!(f, "{sign}{}ms", magnitude / 1_000_000)
        } else if magnitude >= 1_000 {
            write!(f, "{sign}{}us", magnitude / 1_000)
        } else {
            write!(f, "{sign}{}ns", magnitude)
        }
    }
}
