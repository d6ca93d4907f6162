//! Wall-clock abstraction used to timestamp rooms and decide staleness.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use time::OffsetDateTime;

/// Milliseconds since the Unix epoch, the unit used on the wire for room timestamps.
pub type Millis = u64;

/// Source of the current time for the registry.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> Millis;
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Millis::try_from(millis).unwrap_or_default()
    }
}

/// Clock that only moves when told to. Lets tests step past the staleness threshold.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `start_ms`.
    pub fn new(start_ms: Millis) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let step = Millis::try_from(by.as_millis()).unwrap_or(Millis::MAX);
        self.now.fetch_add(step, Ordering::SeqCst);
    }

    /// Jump to an absolute instant, possibly backwards.
    pub fn set(&self, now_ms: Millis) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
