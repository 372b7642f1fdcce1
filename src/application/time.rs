//! Monotonic timestamps for session controllers.
//!
//! Wall-clock time is read once; every later timestamp is derived from the
//! runtime's monotonic clock. Clock arithmetic is then immune to wall-clock
//! jumps, and stays consistent with timer deadlines when the runtime's time
//! is paused in tests.

use tokio::time::Instant;

use crate::domain::foundation::Timestamp;

/// Maps runtime instants to timestamps and back.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Timestamp,
    origin_instant: Instant,
}

impl MonotonicClock {
    /// Anchor at the current wall-clock time.
    pub fn start() -> Self {
        Self {
            origin: Timestamp::now(),
            origin_instant: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.origin.plus(self.origin_instant.elapsed())
    }

    /// Runtime instant corresponding to `at`. Past timestamps map to the
    /// anchor instant or later.
    pub fn instant_at(&self, at: Timestamp) -> Instant {
        self.origin_instant + at.saturating_since(&self.origin)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}
