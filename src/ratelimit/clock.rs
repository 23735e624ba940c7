//! Monotonic clock for ledger marks.

use std::time::Duration;
use tokio::time::Instant;

/// Monotonic time source for the ledger.
///
/// Marks are signed nanoseconds since the epoch, so `now - quantum` stays
/// representable right after start-up. Uses tokio's `Instant` so paused
/// test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Create a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the epoch.
    #[inline]
    pub fn now_nanos(&self) -> i64 {
        duration_to_nanos(self.epoch.elapsed())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a duration to signed nanoseconds, saturating at `i64::MAX`.
#[inline]
pub(crate) fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}
