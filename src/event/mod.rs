//! Host event-loop contracts.
//!
//! - [`Dispatcher`], [`HostTimer`]: the host loop's one-shot timer primitive
//! - [`TimeSource`]: where "now" comes from
//! - [`TrackedScope`], [`ScopeGuard`]: diagnostic scope stack for callbacks

mod dispatcher;
pub(crate) mod driver;

pub use dispatcher::{Dispatcher, HostTimer, ScopeGuard, TimeSource, TimerCallback, TrackedScope};
