//! Host dispatcher contracts.
//!
//! The scaled-timer facility does not own an event loop. It is driven by a
//! host dispatcher that supplies two things: one-shot timers firing on the
//! dispatcher thread, and a monotonic time source. [`crate::sim`] provides a
//! virtual-time implementation for tests and [`crate::runloop`] a minimal
//! wall-clock one; callers with their own loop implement [`Dispatcher`].

use crate::types::MonotonicTime;
use std::rc::Rc;
use std::time::Duration;

/// Callback invoked when a timer fires.
pub type TimerCallback = Box<dyn FnMut()>;

/// Where "now" comes from.
///
/// Implementations must be non-decreasing: successive calls to `now` never
/// go backwards. The whole facility is single-threaded by contract, so
/// implementations are not required to be `Send` or `Sync`; the bundled
/// hosts use plain interior mutability.
pub trait TimeSource {
    /// Returns the current instant.
    fn now(&self) -> MonotonicTime;
}

/// A one-shot timer owned by the host dispatcher.
///
/// # Contract
///
/// - `enable` arms (or re-arms) the timer to fire once after `delay`,
///   replacing any pending fire.
/// - `enable` with `Duration::ZERO` fires on the *next* dispatcher turn,
///   never synchronously from within `enable`.
/// - `disable` cancels a pending fire; after it returns the callback will
///   not run unless the timer is re-armed. Idempotent.
/// - All calls happen on the dispatcher thread.
pub trait HostTimer {
    /// Arms the timer to fire once after `delay`.
    fn enable(&mut self, delay: Duration);

    /// Cancels a pending fire, if any.
    fn disable(&mut self);

    /// Returns true if the timer is armed.
    fn enabled(&self) -> bool;
}

/// An opaque diagnostic object tracked while a callback runs.
///
/// The dispatcher keeps a stack of these; the top of the stack tags log
/// output and crash dumps with "what was being processed".
pub trait TrackedScope {
    /// A short human-readable tag for this scope.
    fn scope_name(&self) -> &str;
}

/// The host event loop, as seen by the timer facility.
pub trait Dispatcher {
    /// Creates a one-shot timer that invokes `callback` when it fires.
    fn create_timer(&self, callback: TimerCallback) -> Box<dyn HostTimer>;

    /// Returns the dispatcher's time source.
    fn time_source(&self) -> Rc<dyn TimeSource>;

    /// Pushes a tracked scope onto the dispatcher-local stack.
    fn push_tracked_scope(&self, scope: Rc<dyn TrackedScope>);

    /// Pops the most recently pushed tracked scope.
    fn pop_tracked_scope(&self);
}

/// RAII guard that keeps a [`TrackedScope`] on the dispatcher stack for
/// the duration of a callback dispatch.
pub struct ScopeGuard<'a> {
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> ScopeGuard<'a> {
    /// Pushes `scope` onto `dispatcher`'s stack until the guard drops.
    pub fn new(dispatcher: &'a dyn Dispatcher, scope: Rc<dyn TrackedScope>) -> Self {
        dispatcher.push_tracked_scope(scope);
        Self { dispatcher }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.pop_tracked_scope();
    }
}
