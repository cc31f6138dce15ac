//! Property tests: random interleavings of arm, disarm, scale changes,
//! clock advances, and timer drops, with the manager's structural
//! consistency checked after every step.
//!
//! The accounting law checked at the end: every arm leads to exactly one
//! callback unless it was cancelled first, where a cancel is a disable,
//! a drop, or a re-arm of a still-armed timer.

mod common;

use common::init_test_logging;
use proptest::prelude::*;
use scaletimer::sim::SimDispatcher;
use scaletimer::{RangeTimer, ScaledRangeTimerManager};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const SLOTS: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Enable {
        slot: usize,
        min_ms: u32,
        max_ms: u32,
    },
    Disable {
        slot: usize,
    },
    DropTimer {
        slot: usize,
    },
    SetScale {
        per_mille: u16,
    },
    Advance {
        ms: u32,
    },
    RunReady,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..SLOTS, 0u32..3000, 0u32..3000).prop_map(|(slot, a, b)| Op::Enable {
            slot,
            min_ms: a.min(b),
            max_ms: a.max(b),
        }),
        1 => (0..SLOTS).prop_map(|slot| Op::Disable { slot }),
        1 => (0..SLOTS).prop_map(|slot| Op::DropTimer { slot }),
        1 => (0u16..=1000).prop_map(|per_mille| Op::SetScale { per_mille }),
        3 => (0u32..5000).prop_map(|ms| Op::Advance { ms }),
        1 => Just(Op::RunReady),
    ]
}

struct Harness {
    dispatcher: Rc<SimDispatcher>,
    manager: ScaledRangeTimerManager,
    slots: Vec<Option<RangeTimer>>,
    counters: Vec<Rc<Cell<u64>>>,
    enables: u64,
    cancels: u64,
}

impl Harness {
    fn new() -> Self {
        let dispatcher = Rc::new(SimDispatcher::new());
        let manager = ScaledRangeTimerManager::new(dispatcher.clone(), 1.0);
        Self {
            dispatcher,
            manager,
            slots: (0..SLOTS).map(|_| None).collect(),
            counters: (0..SLOTS).map(|_| Rc::new(Cell::new(0))).collect(),
            enables: 0,
            cancels: 0,
        }
    }

    fn total_fires(&self) -> u64 {
        self.counters.iter().map(|c| c.get()).sum()
    }

    /// Counts a cancel if the slot currently holds an armed timer.
    fn note_cancel_if_armed(&mut self, slot: usize) {
        if self.slots[slot].as_ref().is_some_and(RangeTimer::enabled) {
            self.cancels += 1;
        }
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Enable { slot, min_ms, max_ms } => {
                self.note_cancel_if_armed(slot);
                if self.slots[slot].is_none() {
                    let counter = Rc::clone(&self.counters[slot]);
                    self.slots[slot] = Some(
                        self.manager
                            .create_timer(move || counter.set(counter.get() + 1)),
                    );
                }
                if let Some(timer) = self.slots[slot].as_ref() {
                    timer.enable(
                        Duration::from_millis(u64::from(min_ms)),
                        Duration::from_millis(u64::from(max_ms)),
                    );
                }
                self.enables += 1;
            }
            Op::Disable { slot } => {
                self.note_cancel_if_armed(slot);
                if let Some(timer) = self.slots[slot].as_ref() {
                    timer.disable();
                }
            }
            Op::DropTimer { slot } => {
                self.note_cancel_if_armed(slot);
                self.slots[slot] = None;
            }
            Op::SetScale { per_mille } => {
                self.manager.set_scale_factor(f32::from(per_mille) / 1000.0);
            }
            Op::Advance { ms } => {
                self.dispatcher.advance(Duration::from_millis(u64::from(ms)));
            }
            Op::RunReady => {
                self.dispatcher.run_ready();
            }
        }
    }

    /// Lets every outstanding arm run to completion.
    fn drain(&mut self) {
        self.dispatcher.advance(Duration::from_secs(3600));
        self.dispatcher.advance(Duration::from_secs(3600));
        self.dispatcher.run_ready();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn manager_stays_consistent_under_random_interleavings(
        ops in prop::collection::vec(arb_op(), 1..48)
    ) {
        init_test_logging();
        let mut harness = Harness::new();

        for op in &ops {
            harness.apply(op);
            harness.manager.assert_valid();
            prop_assert!(harness.total_fires() <= harness.enables);
        }

        harness.drain();
        harness.manager.assert_valid();

        // Nothing is left armed once every window has elapsed.
        for slot in harness.slots.iter().flatten() {
            prop_assert!(!slot.enabled());
        }
        prop_assert_eq!(harness.manager.active_count(), 0);
        prop_assert_eq!(harness.manager.triggerable_count(), 0);

        // Exactly one fire per non-cancelled arm.
        prop_assert_eq!(harness.total_fires(), harness.enables - harness.cancels);
    }

    #[test]
    fn enable_then_disable_round_trips_to_nothing(
        min_ms in 0u32..2000,
        extra_ms in 0u32..2000,
        per_mille in 0u16..=1000,
    ) {
        init_test_logging();
        let dispatcher = Rc::new(SimDispatcher::new());
        let manager = ScaledRangeTimerManager::new(
            dispatcher.clone(),
            f32::from(per_mille) / 1000.0,
        );
        let fires = Rc::new(Cell::new(0u64));

        let timer = {
            let fires = Rc::clone(&fires);
            manager.create_timer(move || fires.set(fires.get() + 1))
        };
        timer.enable(
            Duration::from_millis(u64::from(min_ms)),
            Duration::from_millis(u64::from(min_ms + extra_ms)),
        );
        timer.disable();

        prop_assert!(!timer.enabled());
        prop_assert_eq!(manager.active_count(), 0);
        prop_assert_eq!(manager.triggerable_count(), 0);
        manager.assert_valid();

        dispatcher.advance(Duration::from_secs(3600));
        dispatcher.run_ready();
        prop_assert_eq!(fires.get(), 0);
    }
}
