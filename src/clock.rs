//! Clock abstraction.
//!
//! The scheduler loop and retry backoff are driven entirely off a `Clock`
//! rather than `Utc::now()` directly, so tests can advance time
//! deterministically instead of sleeping in wall-clock time.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Anything that can report the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// A `Clock` backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A `Clock` whose time is set explicitly by the test driving it.
///
/// Cloning a `ManualClock` yields a handle to the same shared instant.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.inner.write().unwrap() = t;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.inner.write().unwrap();
        *guard += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.read().unwrap()
    }
}
