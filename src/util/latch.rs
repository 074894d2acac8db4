//! Countdown latch used as the search's per-layer barrier.
//!
//! The coordinator arms the latch with the number of scheduled tasks and
//! blocks in `wait`; every task calls `count_down` exactly once, including
//! on the panic path.

use std::sync::{Condvar, Mutex};

pub struct Latch {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let mut remaining = match self.remaining.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug_assert!(*remaining > 0, "latch counted below zero");
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.condvar.notify_all();
        }
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut remaining = match self.remaining.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *remaining > 0 {
            remaining = match self.condvar.wait(remaining) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Counts down the owning latch when dropped, so a panicking task still
/// releases the barrier.
pub struct LatchGuard<'a> {
    latch: &'a Latch,
}

impl<'a> LatchGuard<'a> {
    pub fn new(latch: &'a Latch) -> Self {
        Self { latch }
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
