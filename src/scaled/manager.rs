//! The manager that scales and dispatches range timers.

use crate::config::ManagerConfig;
use crate::event::{Dispatcher, HostTimer, TimeSource};
use crate::scaled::range_timer::{self, RangeTimer, TimerRef, TimerState};
use crate::scaled::timeline::{ActiveKey, ScaledTimeline};
use crate::types::{ScaleFactor, TimeDelta};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Where [`ManagerCore::add`] placed a timer.
#[derive(Debug, Clone, Copy)]
pub(super) enum Placement {
    /// In the active set, waiting for its scaled deadline.
    Active(ActiveKey),
    /// Straight into the triggerable set (scale factor is zero).
    Triggerable(u64),
}

impl Placement {
    pub(super) fn into_state(self) -> TimerState {
        match self {
            Self::Active(key) => TimerState::ActiveMax { key },
            Self::Triggerable(seq) => TimerState::Triggerable { seq },
        }
    }
}

/// Shared state behind a [`ScaledRangeTimerManager`].
///
/// Every [`RangeTimer`] holds an `Rc` of this, so the core structurally
/// outlives the timers it tracks. All access happens on the dispatcher
/// thread; the `RefCell` is never borrowed across a user callback.
pub(super) struct ManagerCore {
    dispatcher: Rc<dyn Dispatcher>,
    scale: ScaleFactor,
    timeline: ScaledTimeline<TimerRef>,
    triggerable: BTreeMap<u64, TimerRef>,
    next_seq: u64,
    manager_timer: Box<dyn HostTimer>,
    max_timer_delta: TimeDelta,
}

impl ManagerCore {
    pub(super) fn dispatcher(&self) -> Rc<dyn Dispatcher> {
        Rc::clone(&self.dispatcher)
    }

    /// Places `timer` for a scaled-maximum wait of `remaining`.
    ///
    /// The caller writes the returned placement into the timer's state;
    /// `add` itself never touches the cell, so the caller may hold no
    /// borrow of it while the sets and the manager timer are updated.
    pub(super) fn add(core: &Rc<RefCell<Self>>, timer: TimerRef, remaining: TimeDelta) -> Placement {
        let mut this = core.borrow_mut();
        this.advance_cursor();
        let remaining = remaining.max_zero().min(this.max_timer_delta);
        let placement = if this.scale.is_zero() {
            let seq = this.alloc_seq();
            this.triggerable.insert(seq, timer);
            Placement::Triggerable(seq)
        } else {
            Placement::Active(this.timeline.insert(timer, remaining))
        };
        this.reprogram();
        placement
    }

    /// Removes an entry from the active set (timer disabled mid-wait).
    pub(super) fn remove_active(core: &Rc<RefCell<Self>>, key: ActiveKey) {
        let mut this = core.borrow_mut();
        let removed = this.timeline.remove(key);
        debug_assert!(removed.is_some(), "active timer missing from timeline");
        this.reprogram();
    }

    /// Removes an entry from the triggerable set.
    ///
    /// Tolerates a missing `seq`: the drain snapshot may already have
    /// taken the entry out, in which case the state check in the drain
    /// loop is what prevents the fire.
    pub(super) fn cancel_triggerable(core: &Rc<RefCell<Self>>, seq: u64) {
        let mut this = core.borrow_mut();
        this.triggerable.remove(&seq);
        this.reprogram();
    }

    pub(super) fn set_scale_factor(core: &Rc<RefCell<Self>>, scale_factor: f32) {
        let mut this = core.borrow_mut();
        let scale = ScaleFactor::new(scale_factor);
        // The real time that elapsed so far ran under the old factor.
        this.advance_cursor();
        tracing::debug!(scale = scale.value(), "scale factor updated");
        this.scale = scale;
        if scale.is_zero() {
            let Self {
                timeline,
                triggerable,
                next_seq,
                ..
            } = &mut *this;
            for (_key, cell) in timeline.drain_all() {
                let seq = *next_seq;
                *next_seq += 1;
                cell.borrow_mut().state = TimerState::Triggerable { seq };
                triggerable.insert(seq, cell);
            }
        }
        this.reprogram();
    }

    /// The manager host timer fired: catch the cursor up, then run every
    /// timer that was already due. The triggerable set is snapshotted and
    /// cleared first, because callbacks may arm timers into either set;
    /// anything they add waits for the next turn.
    fn on_manager_timer(core: &Rc<RefCell<Self>>) {
        let snapshot: Vec<(u64, TimerRef)> = {
            let mut this = core.borrow_mut();
            this.advance_cursor();
            mem::take(&mut this.triggerable).into_iter().collect()
        };
        for (seq, cell) in snapshot {
            // A callback earlier in this drain may have disabled or
            // re-armed this timer; only fire if it still holds the seq it
            // was snapshotted with.
            let due = matches!(cell.borrow().state, TimerState::Triggerable { seq: s } if s == seq);
            if due {
                range_timer::fire(&cell);
            }
        }
        core.borrow_mut().reprogram();
    }

    /// Advances the scaled-time cursor to now, moving every timer whose
    /// scaled deadline has passed into the triggerable set.
    fn advance_cursor(&mut self) {
        let now = self.dispatcher.time_source().now();
        let Self {
            timeline,
            triggerable,
            next_seq,
            scale,
            ..
        } = self;
        let due = timeline.advance(now, *scale, |cell, new_key| {
            cell.borrow_mut().state = TimerState::ActiveMax { key: new_key };
        });
        for (_key, cell) in due {
            let seq = *next_seq;
            *next_seq += 1;
            cell.borrow_mut().state = TimerState::Triggerable { seq };
            triggerable.insert(seq, cell);
        }
    }

    /// Re-arms or disables the manager host timer after a state change.
    ///
    /// Triggerable work pending: fire on the next turn. Otherwise the
    /// delay is the real-time distance to the earliest scaled deadline,
    /// or nothing is armed at all.
    fn reprogram(&mut self) {
        if !self.triggerable.is_empty() {
            self.manager_timer.enable(Duration::ZERO);
        } else if let Some(delay) = self.timeline.first_real_delay(self.scale) {
            self.manager_timer.enable(delay);
        } else {
            self.manager_timer.disable();
        }
    }

    fn alloc_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl std::fmt::Debug for ManagerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerCore")
            .field("scale", &self.scale)
            .field("active", &self.timeline.len())
            .field("triggerable", &self.triggerable.len())
            .finish_non_exhaustive()
    }
}

/// Creates range timers and compresses their `[min, max]` windows by a
/// shared scale factor.
///
/// One host timer serves every timer past its minimum: the manager keeps
/// pending scaled deadlines in an ordered set and re-arms its host timer
/// for the earliest one after every state change. Setting the scale
/// factor to `0` makes every timer past its minimum due immediately.
///
/// # Example
///
/// ```
/// use scaletimer::sim::SimDispatcher;
/// use scaletimer::ScaledRangeTimerManager;
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let dispatcher = Rc::new(SimDispatcher::new());
/// let manager = ScaledRangeTimerManager::new(dispatcher.clone(), 1.0);
///
/// let fired = Rc::new(Cell::new(false));
/// let observed = fired.clone();
/// let timer = manager.create_timer(move || observed.set(true));
///
/// timer.enable(Duration::from_secs(1), Duration::from_secs(5));
/// dispatcher.advance(Duration::from_secs(5));
/// assert!(fired.get());
/// ```
pub struct ScaledRangeTimerManager {
    core: Rc<RefCell<ManagerCore>>,
    next_timer_id: Cell<u64>,
}

impl ScaledRangeTimerManager {
    /// Creates a manager with the given initial scale factor (clamped to
    /// `[0, 1]`).
    #[must_use]
    pub fn new(dispatcher: Rc<dyn Dispatcher>, scale_factor: f32) -> Self {
        let config = ManagerConfig {
            initial_scale_factor: scale_factor,
            ..ManagerConfig::default()
        };
        Self::with_config(dispatcher, config)
    }

    /// Creates a manager from a [`ManagerConfig`].
    #[must_use]
    pub fn with_config(dispatcher: Rc<dyn Dispatcher>, config: ManagerConfig) -> Self {
        let mut config = config;
        config.normalize();
        let now = dispatcher.time_source().now();
        let core = Rc::new_cyclic(|weak: &Weak<RefCell<ManagerCore>>| {
            let weak = weak.clone();
            let manager_timer = dispatcher.create_timer(Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    ManagerCore::on_manager_timer(&core);
                }
            }));
            RefCell::new(ManagerCore {
                dispatcher: Rc::clone(&dispatcher),
                scale: ScaleFactor::new(config.initial_scale_factor),
                timeline: ScaledTimeline::new(now),
                triggerable: BTreeMap::new(),
                next_seq: 0,
                manager_timer,
                max_timer_delta: TimeDelta::from_duration(config.max_timer_duration),
            })
        });
        Self {
            core,
            next_timer_id: Cell::new(0),
        }
    }

    /// Creates a new range timer whose fires invoke `callback`.
    #[must_use]
    pub fn create_timer(&self, callback: impl FnMut() + 'static) -> RangeTimer {
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id + 1);
        RangeTimer::new(&self.core, id, Box::new(callback))
    }

    /// Sets the scale factor for every timer created through this
    /// manager, clamped to `[0, 1]`. A factor of `0` moves every timer
    /// past its minimum into the triggerable set at once.
    pub fn set_scale_factor(&self, scale_factor: f32) {
        ManagerCore::set_scale_factor(&self.core, scale_factor);
    }

    /// The current (clamped) scale factor.
    #[must_use]
    pub fn scale_factor(&self) -> f32 {
        self.core.borrow().scale.value()
    }

    /// Number of timers waiting for their scaled maximum.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.core.borrow().timeline.len()
    }

    /// Number of timers due but not yet dispatched.
    #[must_use]
    pub fn triggerable_count(&self) -> usize {
        self.core.borrow().triggerable.len()
    }

    /// Verifies the manager's structural consistency, panicking on any
    /// violation. Test support; not part of the stable API.
    #[doc(hidden)]
    pub fn assert_valid(&self) {
        let this = self.core.borrow();
        assert!(
            this.timeline.cursor().as_nanos() < 0,
            "scaled-time cursor must stay negative between operations"
        );
        assert!(
            !this.scale.is_zero() || this.timeline.is_empty(),
            "active set must be empty under a zero scale factor"
        );
        for (key, cell) in this.timeline.iter() {
            let state = cell.borrow().state;
            assert!(
                matches!(state, TimerState::ActiveMax { key: k } if k == *key),
                "active entry state out of sync: {state:?} vs {key:?}"
            );
        }
        for (seq, cell) in &this.triggerable {
            let state = cell.borrow().state;
            assert!(
                matches!(state, TimerState::Triggerable { seq: s } if s == *seq),
                "triggerable entry state out of sync: {state:?} vs seq {seq}"
            );
        }
    }
}

impl std::fmt::Debug for ScaledRangeTimerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.core.borrow().fmt(f)
    }
}
