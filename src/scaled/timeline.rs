//! Scaled-time cursor and the ordered set of pending scaled deadlines.
//!
//! Scaled time advances at `1/scale` times the rate of real time, so a
//! small scale factor makes scaled deadlines arrive sooner in real time.
//! Rather than letting a scaled clock grow without bound (at a scale of
//! `f32::MIN_POSITIVE` it would exhaust a signed 64-bit range in fractions
//! of a real second), the cursor lives in negative territory: it starts at
//! the most negative representable position, creeps toward zero as scaled
//! time passes, and is rebased back to the bottom whenever it would cross
//! zero. Rebasing shifts every stored deadline by the same offset, which
//! preserves their order.
//!
//! Between operations the cursor is strictly negative, and every stored
//! deadline is at most half the signed range above it, so no `i64`
//! arithmetic here can overflow.

use crate::types::{MonotonicTime, ScaleFactor, TimeDelta};
use std::collections::BTreeMap;
use std::mem;
use std::time::Duration;

/// A position in scaled time, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ScaledTime(i64);

impl ScaledTime {
    /// The bottom of the cursor's travel.
    pub(crate) const MIN: Self = Self(i64::MIN / 2);

    /// The longest span a single deadline or cursor step may cover.
    pub(crate) const HALF_RANGE: i64 = i64::MAX / 2;

    /// Nanosecond value, for diagnostics and consistency checks.
    pub(crate) const fn as_nanos(self) -> i64 {
        self.0
    }
}

impl std::fmt::Debug for ScaledTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScaledTime({}ns)", self.0)
    }
}

/// Key of an entry in the active set.
///
/// Ordered by scaled deadline, then by a per-insertion generation so that
/// entries with equal deadlines keep their arm order. The generation also
/// makes the key a stable handle: it survives rebases unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ActiveKey {
    pub(crate) deadline: ScaledTime,
    pub(crate) generation: u64,
}

/// The cursor plus the ordered set of entries waiting for their scaled
/// maximum.
///
/// Generic over the entry payload so the arithmetic can be exercised
/// without any timer plumbing.
#[derive(Debug)]
pub(crate) struct ScaledTimeline<T> {
    cursor: ScaledTime,
    last_event_time: MonotonicTime,
    active: BTreeMap<ActiveKey, T>,
    next_generation: u64,
}

impl<T> ScaledTimeline<T> {
    pub(crate) fn new(now: MonotonicTime) -> Self {
        Self {
            cursor: ScaledTime::MIN,
            last_event_time: now,
            active: BTreeMap::new(),
            next_generation: 0,
        }
    }

    /// Moves the cursor forward to `now` and removes every entry whose
    /// deadline has been reached, returning them in deadline order.
    ///
    /// `rekey` is invoked for each surviving entry whose key changed
    /// because of a rebase. Calling `advance` twice with the same `now`
    /// leaves the timeline unchanged the second time.
    pub(crate) fn advance<R>(
        &mut self,
        now: MonotonicTime,
        scale: ScaleFactor,
        mut rekey: R,
    ) -> Vec<(ActiveKey, T)>
    where
        R: FnMut(&T, ActiveKey),
    {
        let delta_real = (now - self.last_event_time).max_zero();
        self.last_event_time = now;

        if scale.is_zero() || self.active.is_empty() {
            self.cursor = ScaledTime::MIN;
            return Vec::new();
        }

        let delta_scaled = delta_real.as_nanos() as f64 / f64::from(scale.value());
        if !delta_scaled.is_finite() || delta_scaled >= ScaledTime::HALF_RANGE as f64 {
            // A step this large passes every representable deadline.
            tracing::debug!(
                delta = %delta_real,
                scale = scale.value(),
                drained = self.active.len(),
                "scaled step exceeds representable range; draining active set"
            );
            self.cursor = ScaledTime::MIN;
            return mem::take(&mut self.active).into_iter().collect();
        }

        self.cursor = ScaledTime(self.cursor.0.saturating_add(delta_scaled as i64));
        let due = self.take_due_prefix();
        if self.cursor.0 >= 0 {
            self.rebase(&mut rekey);
        }
        due
    }

    /// Inserts an entry due `remaining` of scaled time from now.
    ///
    /// `remaining` is clamped to `[0, HALF_RANGE]`; an astronomically
    /// distant deadline fires eventually rather than wrapping.
    pub(crate) fn insert(&mut self, value: T, remaining: TimeDelta) -> ActiveKey {
        let span = remaining.as_nanos().clamp(0, ScaledTime::HALF_RANGE);
        let key = ActiveKey {
            deadline: ScaledTime(self.cursor.0 + span),
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.active.insert(key, value);
        key
    }

    /// Removes the entry at `key`, if present.
    pub(crate) fn remove(&mut self, key: ActiveKey) -> Option<T> {
        self.active.remove(&key)
    }

    /// Removes and returns every entry, in deadline order.
    pub(crate) fn drain_all(&mut self) -> Vec<(ActiveKey, T)> {
        mem::take(&mut self.active).into_iter().collect()
    }

    /// Real-time delay until the earliest deadline under `scale`, if any
    /// entry is pending.
    ///
    /// Rounded up to a whole nanosecond: a truncated-to-zero delay would
    /// re-fire the manager timer at the same instant without the cursor
    /// having moved, and never make progress.
    pub(crate) fn first_real_delay(&self, scale: ScaleFactor) -> Option<Duration> {
        let (key, _) = self.active.first_key_value()?;
        let span = (key.deadline.0 - self.cursor.0).max(0) as f64;
        let real = (span * f64::from(scale.value())).ceil();
        Some(Duration::from_nanos(real as u64))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn cursor(&self) -> ScaledTime {
        self.cursor
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ActiveKey, &T)> {
        self.active.iter()
    }

    fn take_due_prefix(&mut self) -> Vec<(ActiveKey, T)> {
        let mut due = Vec::new();
        while self
            .active
            .first_key_value()
            .is_some_and(|(key, _)| key.deadline <= self.cursor)
        {
            if let Some(entry) = self.active.pop_first() {
                due.push(entry);
            }
        }
        due
    }

    /// Shifts every surviving deadline down by the cursor's excursion and
    /// resets the cursor to the bottom. The shift is uniform, so relative
    /// order is untouched.
    fn rebase<R>(&mut self, rekey: &mut R)
    where
        R: FnMut(&T, ActiveKey),
    {
        let offset = self.cursor.0 - ScaledTime::MIN.0;
        tracing::debug!(
            offset_ns = offset,
            survivors = self.active.len(),
            "rebasing scaled-time cursor"
        );
        if offset > 0 && !self.active.is_empty() {
            let shifted = mem::take(&mut self.active)
                .into_iter()
                .map(|(key, value)| {
                    let key = ActiveKey {
                        deadline: ScaledTime(key.deadline.0 - offset),
                        generation: key.generation,
                    };
                    rekey(&value, key);
                    (key, value)
                })
                .collect();
            self.active = shifted;
        }
        self.cursor = ScaledTime::MIN;
    }
}
