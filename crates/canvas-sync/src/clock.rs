//! Wall-clock sources.
//!
//! Lock records and annotations carry epoch-millisecond timestamps that are
//! compared across clients, so they need a wall clock. Timers use tokio time.

use canvas_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Source of epoch-millisecond timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> Timestamp;
}

/// Wall clock anchored once and advanced with tokio's monotonic clock.
///
/// Under a paused test runtime the clock moves with `tokio::time::advance`.
#[derive(Clone, Debug)]
pub struct SystemClock {
    anchor_millis: Timestamp,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_millis = chrono::Utc::now().timestamp_millis().max(0) as Timestamp;
        Self {
            anchor_millis,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        self.anchor_millis + self.anchor.elapsed().as_millis() as Timestamp
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
