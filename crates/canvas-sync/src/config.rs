//! Timing configuration for the synchronization engine.

use canvas_core::GeometryLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Configuration for write throttling, locking and reconciliation.
///
/// Deserializes from camelCase JSON; missing fields keep their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiet period after the last mutation of an object before it is written.
    pub write_debounce_ms: u64,
    /// Minimum spacing between two writes of the same object.
    pub min_write_interval_ms: u64,
    /// Retries after the first failed attempt of a write.
    pub max_write_retries: u32,
    /// Base retry delay; attempt `n` waits `n` times this.
    pub retry_backoff_ms: u64,
    /// A manipulation lock becomes idle after this long without activity.
    pub lock_activity_window_ms: u64,
    /// An idle lock is released after this long.
    pub lock_idle_countdown_ms: u64,
    /// Locks whose owner has been silent this long are swept.
    pub stale_lock_ttl_ms: u64,
    /// Period of the stale-lock sweep.
    pub stale_lock_sweep_interval_ms: u64,
    /// How long an object stays actively edited after its last local mutation.
    pub local_edit_window_ms: u64,
    /// Coalescing window for snapshot deliveries; zero applies them inline.
    pub snapshot_debounce_ms: u64,
    /// Reconciliation delay while, and shortly after, a create is in flight.
    pub create_settle_ms: u64,
    pub limits: GeometryLimits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_debounce_ms: 100,
            min_write_interval_ms: 50,
            max_write_retries: 3,
            retry_backoff_ms: 1000,
            lock_activity_window_ms: 1000,
            lock_idle_countdown_ms: 1000,
            stale_lock_ttl_ms: 30_000,
            stale_lock_sweep_interval_ms: 10_000,
            local_edit_window_ms: 5000,
            snapshot_debounce_ms: 0,
            create_settle_ms: 100,
            limits: GeometryLimits::default(),
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Defaults overridden by `CANVAS_*` environment variables.
    ///
    /// Values that fail to parse or fall outside their range are ignored
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let ms = |key: &str, current: u64, min: u64, max: u64| -> u64 {
            read_ranged(&lookup, key, current, min, max)
        };

        config.write_debounce_ms = ms("CANVAS_WRITE_DEBOUNCE_MS", config.write_debounce_ms, 1, 1000);
        config.min_write_interval_ms =
            ms("CANVAS_MIN_WRITE_INTERVAL_MS", config.min_write_interval_ms, 1, 1000);
        config.max_write_retries = read_ranged(
            &lookup,
            "CANVAS_MAX_WRITE_RETRIES",
            config.max_write_retries,
            0,
            10,
        );
        config.retry_backoff_ms = ms("CANVAS_RETRY_BACKOFF_MS", config.retry_backoff_ms, 100, 10_000);
        config.lock_activity_window_ms = ms(
            "CANVAS_LOCK_ACTIVITY_WINDOW_MS",
            config.lock_activity_window_ms,
            100,
            60_000,
        );
        config.lock_idle_countdown_ms = ms(
            "CANVAS_LOCK_IDLE_COUNTDOWN_MS",
            config.lock_idle_countdown_ms,
            100,
            60_000,
        );
        config.stale_lock_ttl_ms =
            ms("CANVAS_STALE_LOCK_TTL_MS", config.stale_lock_ttl_ms, 1000, 600_000);
        config.stale_lock_sweep_interval_ms = ms(
            "CANVAS_STALE_LOCK_SWEEP_MS",
            config.stale_lock_sweep_interval_ms,
            100,
            600_000,
        );
        config.local_edit_window_ms = ms(
            "CANVAS_LOCAL_EDIT_WINDOW_MS",
            config.local_edit_window_ms,
            100,
            60_000,
        );
        config.snapshot_debounce_ms =
            ms("CANVAS_SNAPSHOT_DEBOUNCE_MS", config.snapshot_debounce_ms, 0, 1000);
        config.create_settle_ms = ms("CANVAS_CREATE_SETTLE_MS", config.create_settle_ms, 0, 5000);
        config
    }

    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }

    pub fn min_write_interval(&self) -> Duration {
        Duration::from_millis(self.min_write_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn lock_activity_window(&self) -> Duration {
        Duration::from_millis(self.lock_activity_window_ms)
    }

    pub fn lock_idle_countdown(&self) -> Duration {
        Duration::from_millis(self.lock_idle_countdown_ms)
    }

    pub fn stale_lock_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.stale_lock_sweep_interval_ms)
    }

    pub fn local_edit_window(&self) -> Duration {
        Duration::from_millis(self.local_edit_window_ms)
    }

    pub fn snapshot_debounce(&self) -> Duration {
        Duration::from_millis(self.snapshot_debounce_ms)
    }

    pub fn create_settle(&self) -> Duration {
        Duration::from_millis(self.create_settle_ms)
    }
}

fn read_ranged<F, T>(lookup: &F, key: &str, current: T, min: T, max: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return current;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value >= min && value <= max => value,
        Ok(value) => {
            warn!(key, %value, %min, %max, "Configuration value out of range, using default");
            current
        }
        Err(_) => {
            warn!(key, raw = %raw, "Configuration value is not a number, using default");
            current
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn write_debounce(mut self, ms: u64) -> Self {
        self.config.write_debounce_ms = ms;
        self
    }

    pub fn min_write_interval(mut self, ms: u64) -> Self {
        self.config.min_write_interval_ms = ms;
        self
    }

    pub fn max_write_retries(mut self, retries: u32) -> Self {
        self.config.max_write_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn lock_activity_window(mut self, ms: u64) -> Self {
        self.config.lock_activity_window_ms = ms;
        self
    }

    pub fn lock_idle_countdown(mut self, ms: u64) -> Self {
        self.config.lock_idle_countdown_ms = ms;
        self
    }

    pub fn stale_lock_ttl(mut self, ms: u64) -> Self {
        self.config.stale_lock_ttl_ms = ms;
        self
    }

    pub fn stale_lock_sweep_interval(mut self, ms: u64) -> Self {
        self.config.stale_lock_sweep_interval_ms = ms;
        self
    }

    pub fn local_edit_window(mut self, ms: u64) -> Self {
        self.config.local_edit_window_ms = ms;
        self
    }

    pub fn snapshot_debounce(mut self, ms: u64) -> Self {
        self.config.snapshot_debounce_ms = ms;
        self
    }

    pub fn create_settle(mut self, ms: u64) -> Self {
        self.config.create_settle_ms = ms;
        self
    }

    pub fn limits(mut self, limits: GeometryLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
