//! Minimal wall-clock host dispatcher.
//!
//! [`RunLoop`] is the simplest production-shaped [`Dispatcher`]: a
//! single-threaded loop that sleeps until the earliest armed deadline,
//! fires what is due, and repeats. Programs that already run an event loop
//! should implement [`Dispatcher`] over it instead; this exists so the
//! timer facility is usable out of the box.

use crate::event::driver::{HostTimerShared, TimerQueue};
use crate::event::{Dispatcher, HostTimer, TimeSource, TimerCallback, TrackedScope};
use crate::types::MonotonicTime;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic source over the OS clock; the epoch is the loop's creation.
struct WallClock {
    epoch: Instant,
}

impl TimeSource for WallClock {
    fn now(&self) -> MonotonicTime {
        MonotonicTime::from_nanos(self.epoch.elapsed().as_nanos() as u64)
    }
}

#[derive(Default)]
struct LoopState {
    queue: TimerQueue,
    scopes: Vec<Rc<dyn TrackedScope>>,
    next_timer_id: u64,
}

/// A sleep-until-deadline dispatcher over the wall clock.
pub struct RunLoop {
    clock: Rc<WallClock>,
    state: Rc<RefCell<LoopState>>,
}

impl RunLoop {
    /// Creates a run loop; its clock epoch is this instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Rc::new(WallClock {
                epoch: Instant::now(),
            }),
            state: Rc::new(RefCell::new(LoopState::default())),
        }
    }

    /// The current instant on the loop's clock.
    #[must_use]
    pub fn now(&self) -> MonotonicTime {
        self.clock.now()
    }

    /// Number of armed host timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Runs one turn: waits for the earliest armed deadline, then fires
    /// everything due. Returns false without waiting when nothing is
    /// armed. Timers armed during the turn wait for the next one.
    pub fn step(&self) -> bool {
        let Some(deadline) = self.state.borrow().queue.next_deadline() else {
            return false;
        };
        let wait = (deadline - self.clock.now()).to_duration();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let now = self.clock.now();
        let boundary = self.state.borrow().queue.turn_boundary();
        loop {
            let due = self.state.borrow_mut().queue.pop_due(now, Some(boundary));
            let Some((fired_at, timer)) = due else { break };
            tracing::trace!(host_timer = timer.id, at = %fired_at, "host timer fired");
            let callback = Rc::clone(&timer.callback);
            (&mut *callback.borrow_mut())();
        }
        true
    }

    /// Runs turns until no timer is armed.
    pub fn run_until_idle(&self) {
        while self.step() {}
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("now", &self.clock.now())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl Dispatcher for RunLoop {
    fn create_timer(&self, callback: TimerCallback) -> Box<dyn HostTimer> {
        let mut state = self.state.borrow_mut();
        let id = state.next_timer_id;
        state.next_timer_id += 1;
        Box::new(LoopTimer {
            shared: HostTimerShared::new(id, callback),
            state: Rc::clone(&self.state),
            clock: Rc::clone(&self.clock),
        })
    }

    fn time_source(&self) -> Rc<dyn TimeSource> {
        Rc::clone(&self.clock) as Rc<dyn TimeSource>
    }

    fn push_tracked_scope(&self, scope: Rc<dyn TrackedScope>) {
        self.state.borrow_mut().scopes.push(scope);
    }

    fn pop_tracked_scope(&self) {
        let popped = self.state.borrow_mut().scopes.pop();
        debug_assert!(popped.is_some(), "scope stack underflow");
    }
}

struct LoopTimer {
    shared: Rc<HostTimerShared>,
    state: Rc<RefCell<LoopState>>,
    clock: Rc<WallClock>,
}

impl HostTimer for LoopTimer {
    fn enable(&mut self, delay: Duration) {
        let deadline = self.clock.now() + delay;
        self.state.borrow_mut().queue.arm(&self.shared, deadline);
    }

    fn disable(&mut self) {
        self.state.borrow_mut().queue.disarm(&self.shared);
    }

    fn enabled(&self) -> bool {
        self.shared.armed.get().is_some()
    }
}

impl Drop for LoopTimer {
    fn drop(&mut self) {
        self.state.borrow_mut().queue.disarm(&self.shared);
    }
}
