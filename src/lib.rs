//! Scaletimer: scaled range timers for adaptive timeouts.
//!
//! # Overview
//!
//! A range timer is armed with a window `[min, max]` of acceptable firing
//! times. A manager-wide scale factor in `[0, 1]` compresses the time spent
//! between `min` and `max`: at `1` the timer behaves like a plain `max`
//! timeout, and as the factor approaches `0` firing approaches "immediately
//! after `min`". Driving the factor down under load lets a system shed idle
//! work (connections, streams, sessions) faster exactly when it matters.
//!
//! # Core guarantees
//!
//! - **Never before `min`**: a timer does not fire before its minimum has
//!   elapsed, at any scale factor.
//! - **Deterministic fan-out**: timers with equal deadlines fire in arm
//!   order.
//! - **Synchronous cancel**: after `disable` returns, the callback will not
//!   run unless the timer is re-armed.
//! - **Re-entrant callbacks**: a callback may re-arm, disable, or drop its
//!   own timer, and arm or disable others.
//! - **Bounded arithmetic**: deadline math stays inside a signed 64-bit
//!   nanosecond range across multi-century scaled horizons.
//!
//! # Module structure
//!
//! - [`types`]: instants, signed spans, the scale factor
//! - [`event`]: host dispatcher contracts and time sources
//! - [`scaled`]: the range-timer state machine and its manager
//! - [`config`]: manager configuration
//! - [`sim`]: virtual-time dispatcher for deterministic tests
//! - [`runloop`]: minimal wall-clock dispatcher
//! - [`test_utils`]: logging setup and assertion macros for tests
//!
//! # Example
//!
//! ```
//! use scaletimer::sim::SimDispatcher;
//! use scaletimer::ScaledRangeTimerManager;
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let dispatcher = Rc::new(SimDispatcher::new());
//! let manager = ScaledRangeTimerManager::new(dispatcher.clone(), 1.0);
//!
//! let fired = Rc::new(Cell::new(false));
//! let observed = fired.clone();
//! let timer = manager.create_timer(move || observed.set(true));
//!
//! // Fires somewhere in [10s, 100s]; at full stress it fires right
//! // after the 10s minimum.
//! timer.enable(Duration::from_secs(10), Duration::from_secs(100));
//! dispatcher.advance(Duration::from_secs(10));
//! manager.set_scale_factor(0.0);
//! dispatcher.run_ready();
//! assert!(fired.get());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod event;
pub mod runloop;
pub mod scaled;
pub mod sim;
pub mod test_utils;
pub mod types;

pub use config::ManagerConfig;
pub use event::{Dispatcher, HostTimer, ScopeGuard, TimerCallback, TrackedScope};
pub use scaled::{RangeTimer, ScaledRangeTimerManager, TimerMinimum};
pub use types::{MonotonicTime, ScaleFactor, TimeDelta};
