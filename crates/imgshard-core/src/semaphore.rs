//! Counting semaphore bounding in-flight + buffered rows (C5, §4.5).
//!
//! `Mutex` + `Condvar` from std — no external dependency, matching
//! `papeline_core::semaphore`. Capacity is fixed at `2 * thread_count`
//! for this pipeline (§4.5, §9 "Semaphore release correctness").

use std::sync::{Arc, Condvar, Mutex};

pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard releasing one permit on drop — the only way a permit is
/// released, so every return path in the row processor (success, short
/// circuit, panic unwind) releases it by construction.
pub struct SemaphoreGuard<'a>(&'a Semaphore);

/// Same guarantee as `SemaphoreGuard`, but owning its `Arc<Semaphore>`
/// instead of borrowing, so it can be acquired on one thread and moved
/// to another for release — the producer/consumer split C5 requires
/// (§9 "the permit lifecycle crosses the pool boundary").
pub struct OwnedSemaphoreGuard(Arc<Semaphore>);

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.state.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
        SemaphoreGuard(self)
    }

    /// Block until a permit is available, then acquire it, returning a
    /// guard that owns its own reference to `self` and can cross thread
    /// boundaries.
    pub fn acquire_owned(self: &Arc<Self>) -> OwnedSemaphoreGuard {
        let mut count = self.state.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
        OwnedSemaphoreGuard(Arc::clone(self))
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.0.state.lock().unwrap();
        *count += 1;
        self.0.cond.notify_one();
    }
}

impl Drop for OwnedSemaphoreGuard {
    fn drop(&mut self) {
        let mut count = self.0.state.lock().unwrap();
        *count += 1;
        self.0.cond.notify_one();
    }
}
