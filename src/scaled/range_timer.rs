//! Per-timer state machine for range timers.

use crate::event::{Dispatcher, HostTimer, ScopeGuard, TimeSource, TimerCallback, TrackedScope};
use crate::scaled::manager::ManagerCore;
use crate::scaled::timeline::ActiveKey;
use crate::types::{MonotonicTime, TimeDelta};
use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Shared handle to a timer's cell, as stored in the manager's sets.
pub(super) type TimerRef = Rc<RefCell<TimerCell>>;

/// Lifecycle of a range timer.
///
/// ```text
/// Inactive -> PendingMin -> ActiveMax -> Triggerable -> Inactive
///     ^           |             |             |
///     +-----------+-------------+-------------+   (disable)
/// ```
///
/// A timer armed with `min == 0` skips `PendingMin`; under a zero scale
/// factor it also skips `ActiveMax`.
#[derive(Debug, Clone, Copy)]
pub(super) enum TimerState {
    /// Not armed.
    Inactive,
    /// Waiting for the minimum to elapse on the per-timer host timer.
    PendingMin {
        /// The instant the maximum would elapse, captured at arm time.
        latest_trigger: MonotonicTime,
    },
    /// Past the minimum; indexed in the manager's active set.
    ActiveMax { key: ActiveKey },
    /// Deadline reached; indexed in the manager's triggerable set.
    Triggerable { seq: u64 },
}

/// The state behind a [`RangeTimer`] handle.
///
/// The user callback lives behind its own `RefCell` so a running callback
/// can re-arm or disable the timer it belongs to.
pub(super) struct TimerCell {
    pub(super) id: u64,
    pub(super) manager: Rc<RefCell<ManagerCore>>,
    pub(super) dispatcher: Rc<dyn Dispatcher>,
    pub(super) callback: Rc<RefCell<TimerCallback>>,
    pub(super) pending_timer: Box<dyn HostTimer>,
    pub(super) state: TimerState,
    pub(super) scope: Option<Rc<dyn TrackedScope>>,
}

impl std::fmt::Debug for TimerCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerCell")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A timer that fires once at some instant inside an armed `[min, max]`
/// window, where the time spent between `min` and `max` is compressed by
/// the owning manager's scale factor.
///
/// Created by [`ScaledRangeTimerManager::create_timer`]; dropping the
/// handle disables the timer.
///
/// [`ScaledRangeTimerManager::create_timer`]:
///     crate::scaled::ScaledRangeTimerManager::create_timer
pub struct RangeTimer {
    cell: TimerRef,
}

impl RangeTimer {
    pub(super) fn new(manager: &Rc<RefCell<ManagerCore>>, id: u64, callback: TimerCallback) -> Self {
        let dispatcher = manager.borrow().dispatcher();
        let cell = Rc::new_cyclic(|weak: &Weak<RefCell<TimerCell>>| {
            let weak = weak.clone();
            let pending_timer = dispatcher.create_timer(Box::new(move || {
                if let Some(cell) = weak.upgrade() {
                    on_pending_min_elapsed(&cell);
                }
            }));
            RefCell::new(TimerCell {
                id,
                manager: Rc::clone(manager),
                dispatcher: Rc::clone(&dispatcher),
                callback: Rc::new(RefCell::new(callback)),
                pending_timer,
                state: TimerState::Inactive,
                scope: None,
            })
        });
        Self { cell }
    }

    /// Arms the timer to fire somewhere in `[min, max]` from now.
    ///
    /// Any previous arm is torn down first. With `min == 0` the timer goes
    /// straight into the scaled-maximum wait; under a zero scale factor it
    /// becomes due immediately. `max < min` is a programming error: debug
    /// builds assert, release builds raise `max` to `min`.
    pub fn enable(&self, min: Duration, max: Duration) {
        self.enable_scoped(min, max, None);
    }

    /// Like [`RangeTimer::enable`], additionally keeping `scope` on the
    /// dispatcher's tracked-scope stack while the callback runs.
    pub fn enable_scoped(&self, min: Duration, max: Duration, scope: Option<Rc<dyn TrackedScope>>) {
        debug_assert!(max >= min, "range timer armed with max < min");
        let max = max.max(min);

        disable_cell(&self.cell);

        let (manager, dispatcher, id) = {
            let mut cell = self.cell.borrow_mut();
            cell.scope = scope;
            (Rc::clone(&cell.manager), Rc::clone(&cell.dispatcher), cell.id)
        };
        tracing::trace!(
            timer = id,
            min_ms = min.as_millis() as u64,
            max_ms = max.as_millis() as u64,
            "range timer enabled"
        );

        if min.is_zero() {
            let placement = ManagerCore::add(&manager, Rc::clone(&self.cell), TimeDelta::from_duration(max));
            self.cell.borrow_mut().state = placement.into_state();
        } else {
            let now = dispatcher.time_source().now();
            let mut cell = self.cell.borrow_mut();
            cell.state = TimerState::PendingMin {
                latest_trigger: now + max,
            };
            cell.pending_timer.enable(min);
        }
    }

    /// Arms the timer with a minimum derived from `max` by `minimum`.
    ///
    /// An absolute minimum longer than `max` wins: the window collapses
    /// to `[min, min]` and the timer fires once the minimum has elapsed.
    pub fn enable_with_minimum(&self, minimum: crate::scaled::TimerMinimum, max: Duration) {
        let min = minimum.compute_min(max);
        self.enable(min, max.max(min));
    }

    /// Disarms the timer. After this returns the callback will not run
    /// unless the timer is re-armed. Idempotent.
    pub fn disable(&self) {
        disable_cell(&self.cell);
    }

    /// Returns true while the timer is armed in any state.
    pub fn enabled(&self) -> bool {
        !matches!(self.cell.borrow().state, TimerState::Inactive)
    }
}

impl Drop for RangeTimer {
    fn drop(&mut self) {
        disable_cell(&self.cell);
    }
}

impl std::fmt::Debug for RangeTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.cell.borrow();
        f.debug_struct("RangeTimer")
            .field("id", &cell.id)
            .field("state", &cell.state)
            .finish()
    }
}

/// Tears down whatever state the timer is in and leaves it `Inactive`.
fn disable_cell(cell_rc: &TimerRef) {
    let previous = mem::replace(&mut cell_rc.borrow_mut().state, TimerState::Inactive);
    match previous {
        TimerState::Inactive => {}
        TimerState::PendingMin { .. } => {
            cell_rc.borrow_mut().pending_timer.disable();
        }
        TimerState::ActiveMax { key } => {
            let manager = Rc::clone(&cell_rc.borrow().manager);
            ManagerCore::remove_active(&manager, key);
        }
        TimerState::Triggerable { seq } => {
            let manager = Rc::clone(&cell_rc.borrow().manager);
            ManagerCore::cancel_triggerable(&manager, seq);
        }
    }
}

/// Per-timer host timer fired: the minimum has elapsed; hand the timer to
/// the manager for the scaled-maximum wait.
fn on_pending_min_elapsed(cell_rc: &TimerRef) {
    let (latest_trigger, manager, dispatcher, id) = {
        let cell = cell_rc.borrow();
        match cell.state {
            TimerState::PendingMin { latest_trigger } => (
                latest_trigger,
                Rc::clone(&cell.manager),
                Rc::clone(&cell.dispatcher),
                cell.id,
            ),
            _ => {
                debug_assert!(false, "pending-min elapsed outside PendingMin state");
                return;
            }
        }
    };

    let now = dispatcher.time_source().now();
    let remaining = (latest_trigger - now).max_zero();
    tracing::trace!(timer = id, remaining = %remaining, "pending-min elapsed");

    let placement = ManagerCore::add(&manager, Rc::clone(cell_rc), remaining);
    cell_rc.borrow_mut().state = placement.into_state();
}

/// Runs the user callback for a timer the manager has decided is due.
///
/// The state goes to `Inactive` and the scope is taken *before* the
/// callback runs, so the callback can freely re-arm, disable, or drop the
/// timer.
pub(super) fn fire(cell_rc: &TimerRef) {
    let (callback, scope, dispatcher, id) = {
        let mut cell = cell_rc.borrow_mut();
        cell.state = TimerState::Inactive;
        (
            Rc::clone(&cell.callback),
            cell.scope.take(),
            Rc::clone(&cell.dispatcher),
            cell.id,
        )
    };
    tracing::trace!(timer = id, "range timer triggered");
    match scope {
        Some(scope) => {
            let _guard = ScopeGuard::new(&*dispatcher, scope);
            (&mut *callback.borrow_mut())();
        }
        None => (&mut *callback.borrow_mut())(),
    }
}
