//! Time source abstraction so TTL and liveness logic stay testable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix milliseconds.
///
/// Timestamps only need to be monotonic-enough for a total order; ties are
/// broken by player id wherever ordering matters.
pub trait Clock: Send + Sync {
    /// Current unix time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}
