//! Deadline-ordered queue backing the bundled dispatchers.
//!
//! Both the virtual-time dispatcher and the wall-clock run loop need the
//! same bookkeeping: host timers ordered by `(deadline, generation)`, where
//! the generation is a per-arm counter that both breaks deadline ties in
//! arm order and invalidates stale registrations on re-arm.

use crate::event::dispatcher::TimerCallback;
use crate::types::MonotonicTime;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Where an armed timer currently sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArmSlot {
    pub(crate) deadline: MonotonicTime,
    pub(crate) generation: u64,
}

/// State shared between a host-timer handle and the dispatcher queue.
///
/// The callback lives behind its own `RefCell` so that a running callback
/// can re-arm or disable the very timer that is firing.
pub(crate) struct HostTimerShared {
    pub(crate) id: u64,
    pub(crate) callback: Rc<RefCell<TimerCallback>>,
    pub(crate) armed: Cell<Option<ArmSlot>>,
}

impl HostTimerShared {
    pub(crate) fn new(id: u64, callback: TimerCallback) -> Rc<Self> {
        Rc::new(Self {
            id,
            callback: Rc::new(RefCell::new(callback)),
            armed: Cell::new(None),
        })
    }
}

impl std::fmt::Debug for HostTimerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostTimerShared")
            .field("id", &self.id)
            .field("armed", &self.armed.get())
            .finish_non_exhaustive()
    }
}

/// Deadline-ordered timer queue with generation-based re-arm semantics.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    queue: BTreeMap<(MonotonicTime, u64), Rc<HostTimerShared>>,
    next_generation: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms `timer` for `deadline`, replacing any previous registration.
    pub(crate) fn arm(&mut self, timer: &Rc<HostTimerShared>, deadline: MonotonicTime) {
        self.disarm(timer);
        let generation = self.next_generation;
        self.next_generation += 1;
        timer.armed.set(Some(ArmSlot {
            deadline,
            generation,
        }));
        self.queue
            .insert((deadline, generation), Rc::clone(timer));
    }

    /// Removes `timer` from the queue if it is armed. Idempotent.
    pub(crate) fn disarm(&mut self, timer: &HostTimerShared) {
        if let Some(slot) = timer.armed.take() {
            self.queue.remove(&(slot.deadline, slot.generation));
        }
    }

    /// Returns the earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<MonotonicTime> {
        self.queue.keys().next().map(|&(deadline, _)| deadline)
    }

    /// The generation boundary of the current turn: timers armed from now
    /// on belong to the next turn.
    pub(crate) fn turn_boundary(&self) -> u64 {
        self.next_generation
    }

    /// Pops the earliest timer with `deadline <= now`, if any, returning
    /// it along with its deadline.
    ///
    /// A `boundary` from [`TimerQueue::turn_boundary`] restricts the pop to
    /// timers armed before the current turn started, so zero-delay re-arms
    /// made by a firing callback wait for the next turn.
    pub(crate) fn pop_due(
        &mut self,
        now: MonotonicTime,
        boundary: Option<u64>,
    ) -> Option<(MonotonicTime, Rc<HostTimerShared>)> {
        let (&(deadline, generation), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        if boundary.is_some_and(|b| generation >= b) {
            return None;
        }
        let timer = self.queue.remove(&(deadline, generation))?;
        timer.armed.set(None);
        Some((deadline, timer))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
