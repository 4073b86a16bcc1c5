//! Bounded worker pool.
//!
//! The pool does not decide *what* runs — the scheduler loop does — it only
//! bounds *how many* dispatches are in flight at once, backed by a counting
//! semaphore the way the teacher's `AgentScheduler` bounds concurrent
//! executions. Slots are `'static` owned permits so they can be moved into
//! a spawned dispatch task and released only when that task finishes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max: usize,
    in_flight: Arc<AtomicUsize>,
}

/// RAII guard for one occupied slot; dropping it (e.g. when a dispatch
/// task finishes) releases the permit and decrements `in_flight`.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max: max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Non-blocking slot acquisition. Returns `None` if the pool is full.
    /// The returned `Slot` must be held for the lifetime of the dispatch;
    /// dropping it early releases capacity prematurely.
    pub fn try_acquire(&self) -> Option<Slot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(Slot {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_capacity() {
        let pool = WorkerPool::new(2);
        let s1 = pool.try_acquire();
        let s2 = pool.try_acquire();
        let s3 = pool.try_acquire();
        assert!(s1.is_some());
        assert!(s2.is_some());
        assert!(s3.is_none());
        assert_eq!(pool.in_flight(), 2);

        drop(s1);
        assert_eq!(pool.in_flight(), 1);
        let s4 = pool.try_acquire();
        assert!(s4.is_some());
    }
}
