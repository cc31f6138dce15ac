//! Virtual-time host dispatcher for deterministic tests.
//!
//! [`SimDispatcher`] implements [`Dispatcher`] over its own [`SimClock`].
//! Time only moves when a test calls [`SimDispatcher::advance`] (or its
//! variants), and due timers fire in `(deadline, arm order)` with the clock
//! positioned at each timer's deadline while its callback runs. This is the
//! substitute host loop the scaled-timer facility is tested against.
//!
//! # Example
//!
//! ```
//! use scaletimer::sim::SimDispatcher;
//! use scaletimer::HostTimer;
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let dispatcher = SimDispatcher::new();
//! let fired = Rc::new(Cell::new(0));
//!
//! let observed = fired.clone();
//! let mut timer = dispatcher.create_host_timer(Box::new(move || {
//!     observed.set(observed.get() + 1);
//! }));
//! timer.enable(Duration::from_millis(100));
//!
//! dispatcher.advance(Duration::from_millis(99));
//! assert_eq!(fired.get(), 0);
//! dispatcher.advance(Duration::from_millis(1));
//! assert_eq!(fired.get(), 1);
//! ```

use crate::event::driver::{HostTimerShared, TimerQueue};
use crate::event::{Dispatcher, HostTimer, TimeSource, TimerCallback, TrackedScope};
use crate::types::MonotonicTime;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// The dispatcher's virtual clock.
///
/// The dispatcher steps the clock from deadline to deadline; it never
/// moves backwards. Single-threaded, so a plain `Cell` suffices. Obtained
/// from [`SimDispatcher::clock`].
#[derive(Debug, Default)]
pub struct SimClock {
    now_ns: Cell<u64>,
}

impl SimClock {
    /// The current virtual instant.
    #[must_use]
    pub fn now(&self) -> MonotonicTime {
        MonotonicTime::from_nanos(self.now_ns.get())
    }

    /// Moves the clock to `time` if that is in the future; a target in
    /// the past is ignored.
    pub fn advance_to(&self, time: MonotonicTime) {
        if time.as_nanos() > self.now_ns.get() {
            self.now_ns.set(time.as_nanos());
        }
    }
}

impl TimeSource for SimClock {
    fn now(&self) -> MonotonicTime {
        MonotonicTime::from_nanos(self.now_ns.get())
    }
}

#[derive(Default)]
struct SimState {
    queue: TimerQueue,
    scopes: Vec<Rc<dyn TrackedScope>>,
    next_timer_id: u64,
}

/// A single-threaded host dispatcher driven by virtual time.
pub struct SimDispatcher {
    clock: Rc<SimClock>,
    state: Rc<RefCell<SimState>>,
}

impl SimDispatcher {
    /// Creates a dispatcher with its clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Rc::new(SimClock::default()),
            state: Rc::new(RefCell::new(SimState::default())),
        }
    }

    /// The dispatcher's virtual clock.
    #[must_use]
    pub fn clock(&self) -> Rc<SimClock> {
        Rc::clone(&self.clock)
    }

    /// The current virtual instant.
    #[must_use]
    pub fn now(&self) -> MonotonicTime {
        self.clock.now()
    }

    /// Moves virtual time forward by `delta`, firing every timer that
    /// comes due on the way, in deadline order.
    ///
    /// The clock sits at each timer's deadline while its callback runs.
    /// Timers armed by callbacks fire too if their deadline falls within
    /// the window, so a zero-delay re-arm runs later in the same advance,
    /// on its own turn.
    pub fn advance(&self, delta: Duration) {
        let target = self.clock.now() + delta;
        loop {
            let due = self.state.borrow_mut().queue.pop_due(target, None);
            let Some((deadline, timer)) = due else { break };
            self.clock.advance_to(deadline);
            tracing::trace!(host_timer = timer.id, at = %deadline, "host timer fired");
            Self::run_callback(&timer);
        }
        self.clock.advance_to(target);
    }

    /// Moves virtual time forward to `time` (no-op if in the past).
    pub fn advance_to(&self, time: MonotonicTime) {
        self.advance((time - self.clock.now()).to_duration());
    }

    /// Runs one dispatcher turn: fires timers already due at the current
    /// instant, without moving the clock. Timers armed during the turn
    /// wait for the next one, even at zero delay.
    pub fn run_ready(&self) {
        let now = self.clock.now();
        let boundary = self.state.borrow().queue.turn_boundary();
        loop {
            let due = self.state.borrow_mut().queue.pop_due(now, Some(boundary));
            let Some((_, timer)) = due else { break };
            tracing::trace!(host_timer = timer.id, at = %now, "host timer fired");
            Self::run_callback(&timer);
        }
    }

    /// Number of armed host timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// The earliest pending deadline, if any timer is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<MonotonicTime> {
        self.state.borrow().queue.next_deadline()
    }

    /// Name of the innermost tracked scope, if a callback is running
    /// under one.
    #[must_use]
    pub fn current_scope_name(&self) -> Option<String> {
        self.state
            .borrow()
            .scopes
            .last()
            .map(|scope| scope.scope_name().to_owned())
    }

    /// Creates a host timer directly, outside the [`Dispatcher`] trait.
    /// Handy for tests that exercise the host contract itself.
    #[must_use]
    pub fn create_host_timer(&self, callback: TimerCallback) -> Box<dyn HostTimer> {
        Dispatcher::create_timer(self, callback)
    }

    fn run_callback(timer: &Rc<HostTimerShared>) {
        // Cloned out so the callback can re-arm or disable its own timer.
        let callback = Rc::clone(&timer.callback);
        (&mut *callback.borrow_mut())();
    }
}

impl Default for SimDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDispatcher")
            .field("now", &self.clock.now())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

impl Dispatcher for SimDispatcher {
    fn create_timer(&self, callback: TimerCallback) -> Box<dyn HostTimer> {
        let mut state = self.state.borrow_mut();
        let id = state.next_timer_id;
        state.next_timer_id += 1;
        Box::new(SimTimer {
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

struct SimTimer {
    shared: Rc<HostTimerShared>,
    state: Rc<RefCell<SimState>>,
    clock: Rc<SimClock>,
}

impl HostTimer for SimTimer {
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

impl Drop for SimTimer {
    fn drop(&mut self) {
        self.state.borrow_mut().queue.disarm(&self.shared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> TimerCallback) {
        let count = Rc::new(Cell::new(0));
        let make = {
            let count = Rc::clone(&count);
            move || -> TimerCallback {
                let count = Rc::clone(&count);
                Box::new(move || count.set(count.get() + 1))
            }
        };
        (count, make)
    }

    #[test]
    fn clock_never_moves_backwards() {
        let dispatcher = SimDispatcher::new();
        assert_eq!(dispatcher.now(), MonotonicTime::ZERO);

        dispatcher.advance(Duration::from_secs(5));
        assert_eq!(dispatcher.now(), MonotonicTime::from_secs(5));

        dispatcher.advance_to(MonotonicTime::from_secs(3));
        assert_eq!(dispatcher.now(), MonotonicTime::from_secs(5));
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let dispatcher = SimDispatcher::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut timers = Vec::new();
        for (label, delay_ms) in [("late", 300u64), ("early", 100), ("mid", 200)] {
            let order = Rc::clone(&order);
            let mut timer = dispatcher.create_host_timer(Box::new(move || {
                order.borrow_mut().push(label);
            }));
            timer.enable(Duration::from_millis(delay_ms));
            timers.push(timer);
        }

        dispatcher.advance(Duration::from_secs(1));
        assert_eq!(*order.borrow(), vec!["early", "mid", "late"]);
    }

    #[test]
    fn clock_sits_at_deadline_during_callback() {
        let dispatcher = SimDispatcher::new();
        let clock = dispatcher.clock();
        let seen = Rc::new(Cell::new(MonotonicTime::ZERO));

        let observed = Rc::clone(&seen);
        let probe = {
            let clock = Rc::clone(&clock);
            move || observed.set(clock.now())
        };
        let mut timer = dispatcher.create_host_timer(Box::new(probe));
        timer.enable(Duration::from_millis(250));

        dispatcher.advance(Duration::from_secs(1));
        assert_eq!(seen.get(), MonotonicTime::from_millis(250));
        assert_eq!(dispatcher.now(), MonotonicTime::from_secs(1));
    }

    #[test]
    fn disable_prevents_fire() {
        let dispatcher = SimDispatcher::new();
        let (count, make) = counter();
        let mut timer = dispatcher.create_host_timer(make());
        timer.enable(Duration::from_millis(10));
        assert!(timer.enabled());

        timer.disable();
        assert!(!timer.enabled());
        dispatcher.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn rearm_supersedes_previous_deadline() {
        let dispatcher = SimDispatcher::new();
        let (count, make) = counter();
        let mut timer = dispatcher.create_host_timer(make());
        timer.enable(Duration::from_millis(10));
        timer.enable(Duration::from_millis(500));

        dispatcher.advance(Duration::from_millis(100));
        assert_eq!(count.get(), 0);
        dispatcher.advance(Duration::from_millis(400));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn zero_delay_fires_next_turn_not_synchronously() {
        let dispatcher = SimDispatcher::new();
        let (count, make) = counter();
        let mut timer = dispatcher.create_host_timer(make());
        timer.enable(Duration::ZERO);
        assert_eq!(count.get(), 0);

        dispatcher.run_ready();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn run_ready_defers_arms_made_during_the_turn() {
        let dispatcher = SimDispatcher::new();
        let fired = Rc::new(Cell::new(0u32));

        // The callback re-arms its own timer at zero delay.
        let slot: Rc<RefCell<Option<Box<dyn HostTimer>>>> = Rc::new(RefCell::new(None));
        let timer = {
            let fired = Rc::clone(&fired);
            let slot = Rc::clone(&slot);
            dispatcher.create_host_timer(Box::new(move || {
                fired.set(fired.get() + 1);
                if let Some(timer) = slot.borrow_mut().as_mut() {
                    timer.enable(Duration::ZERO);
                }
            }))
        };
        *slot.borrow_mut() = Some(timer);
        if let Some(timer) = slot.borrow_mut().as_mut() {
            timer.enable(Duration::ZERO);
        }

        dispatcher.run_ready();
        assert_eq!(fired.get(), 1);
        dispatcher.run_ready();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn dropping_the_handle_cancels_the_timer() {
        let dispatcher = SimDispatcher::new();
        let (count, make) = counter();
        let mut timer = dispatcher.create_host_timer(make());
        timer.enable(Duration::from_millis(10));
        assert_eq!(dispatcher.pending_timers(), 1);

        drop(timer);
        assert_eq!(dispatcher.pending_timers(), 0);
        dispatcher.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn scope_stack_tracks_push_and_pop() {
        struct Tag(&'static str);
        impl TrackedScope for Tag {
            fn scope_name(&self) -> &str {
                self.0
            }
        }

        let dispatcher = SimDispatcher::new();
        assert_eq!(dispatcher.current_scope_name(), None);
        dispatcher.push_tracked_scope(Rc::new(Tag("request-7")));
        assert_eq!(dispatcher.current_scope_name().as_deref(), Some("request-7"));
        dispatcher.pop_tracked_scope();
        assert_eq!(dispatcher.current_scope_name(), None);
    }
}
