#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::cell::RefCell;
use std::rc::Rc;

pub use scaletimer::test_utils::init_test_logging;

/// Records fire order by label.
#[derive(Debug, Default, Clone)]
pub struct FireLog {
    entries: Rc<RefCell<Vec<&'static str>>>,
}

impl FireLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends `label` on every fire.
    pub fn callback(&self, label: &'static str) -> impl FnMut() + 'static {
        let entries = Rc::clone(&self.entries);
        move || entries.borrow_mut().push(label)
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
