//! Engine configuration and the versioned snapshot handle.
//!
//! Jobs never read the environment or a mutable global. Each tick starts
//! with [`ConfigHandle::snapshot`] and uses that `Arc<EngineConfig>` until
//! the tick ends, so a reload never tears an iteration in half.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use numguard_core::lifecycle::DEFAULT_MAX_STOP_DAYS;

/// Every tunable of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Incremented on every reload.
    pub version: u64,

    pub strategy_interval: Duration,
    pub cooldown_interval: Duration,
    pub rotation_interval: Duration,
    /// How often the daily job checks whether its local run time passed.
    pub daily_check_interval: Duration,
    pub vendor_sync_interval: Duration,

    /// Concurrent numbers (or pools) processed within one tick.
    pub worker_concurrency: usize,
    /// Upper bound on numbers loaded per team or per cooldown scan.
    pub sweep_batch_size: i64,

    pub stat_base_url: String,
    pub stat_timeout: Duration,
    /// Evaluations look at `[now - stat_window, now]`.
    pub stat_window: chrono::Duration,
    /// A `stat_waiting` lease older than this may be taken over.
    pub lease_ttl: chrono::Duration,

    pub daily_activation_at: NaiveTime,
    pub utc_offset: FixedOffset,

    /// Release a number stuck in recheck without a verdict after this
    /// long. Zero disables.
    pub recheck_grace: chrono::Duration,
    pub max_stop_days: i32,
    pub redistribute: bool,

    pub vendor_base_url: Option<String>,
    pub vendor_token: Option<String>,
    /// Our own name in the vendor's `reserved_by` field.
    pub vendor_owner: String,

    pub manual_queue_capacity: usize,
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `STRATEGY_SWEEP_SECS`   | `300`                   |
    /// | `COOLDOWN_SWEEP_SECS`   | `60`                    |
    /// | `ROTATION_TICK_SECS`    | `180`                   |
    /// | `DAILY_CHECK_SECS`      | `60`                    |
    /// | `VENDOR_SYNC_SECS`      | `600`                   |
    /// | `WORKER_CONCURRENCY`    | `8`                     |
    /// | `SWEEP_BATCH_SIZE`      | `500`                   |
    /// | `STAT_API_URL`          | `http://localhost:8081` |
    /// | `STAT_TIMEOUT_SECS`     | `10`                    |
    /// | `STAT_WINDOW_HOURS`     | `24`                    |
    /// | `LEASE_TTL_SECS`        | `300`                   |
    /// | `DAILY_ACTIVATION_AT`   | `06:00`                 |
    /// | `UTC_OFFSET_MINUTES`    | `0`                     |
    /// | `RECHECK_GRACE_HOURS`   | `72`                    |
    /// | `MAX_STOP_DAYS`         | `90`                    |
    /// | `REDISTRIBUTE`          | `true`                  |
    /// | `VENDOR_API_URL`        | unset (sync disabled)   |
    /// | `VENDOR_API_TOKEN`      | unset                   |
    /// | `VENDOR_OWNER_ID`       | `numguard`              |
    /// | `MANUAL_QUEUE_CAPACITY` | `64`                    |
    /// | `SHUTDOWN_GRACE_SECS`   | `30`                    |
    ///
    /// Unparseable values fall back to the default with a warning; a bad
    /// reload must never take the process down.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Lookup(&lookup);
        Self {
            version: 1,
            strategy_interval: env.secs("STRATEGY_SWEEP_SECS", 300),
            cooldown_interval: env.secs("COOLDOWN_SWEEP_SECS", 60),
            rotation_interval: env.secs("ROTATION_TICK_SECS", 180),
            daily_check_interval: env.secs("DAILY_CHECK_SECS", 60),
            vendor_sync_interval: env.secs("VENDOR_SYNC_SECS", 600),
            worker_concurrency: env.parsed("WORKER_CONCURRENCY", 8usize).max(1),
            sweep_batch_size: env.parsed("SWEEP_BATCH_SIZE", 500i64).max(1),
            stat_base_url: env
                .string("STAT_API_URL")
                .unwrap_or_else(|| "http://localhost:8081".to_string()),
            stat_timeout: env.secs("STAT_TIMEOUT_SECS", 10),
            stat_window: chrono::Duration::hours(env.parsed("STAT_WINDOW_HOURS", 24i64).max(1)),
            lease_ttl: chrono::Duration::seconds(env.parsed("LEASE_TTL_SECS", 300i64).max(1)),
            daily_activation_at: env.time("DAILY_ACTIVATION_AT", NaiveTime::from_hms_opt(6, 0, 0)),
            utc_offset: env.offset("UTC_OFFSET_MINUTES"),
            recheck_grace: chrono::Duration::hours(env.parsed("RECHECK_GRACE_HOURS", 72i64).max(0)),
            max_stop_days: env.parsed("MAX_STOP_DAYS", DEFAULT_MAX_STOP_DAYS).max(1),
            redistribute: env.parsed("REDISTRIBUTE", true),
            vendor_base_url: env.string("VENDOR_API_URL"),
            vendor_token: env.string("VENDOR_API_TOKEN"),
            vendor_owner: env
                .string("VENDOR_OWNER_ID")
                .unwrap_or_else(|| "numguard".to_string()),
            manual_queue_capacity: env.parsed("MANUAL_QUEUE_CAPACITY", 64usize).max(1),
            shutdown_grace: env.secs("SHUTDOWN_GRACE_SECS", 30),
        }
    }
}

struct Lookup<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr + std::fmt::Debug>(&self, key: &str, default: T) -> T {
        match self.string(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, ?default, "Invalid config value, using default");
                default
            }),
        }
    }

    fn secs(&self, key: &str, default: u64) -> Duration {
        Duration::from_secs(self.parsed(key, default).max(1))
    }

    fn time(&self, key: &str, default: Option<NaiveTime>) -> NaiveTime {
        let default = default.unwrap_or(NaiveTime::MIN);
        match self.string(key) {
            None => default,
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "Invalid HH:MM time, using default");
                default
            }),
        }
    }

    fn offset(&self, key: &str) -> FixedOffset {
        let minutes: i32 = self.parsed(key, 0);
        FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(key, minutes, "UTC offset out of range, using UTC");
            Utc.fix()
        })
    }
}

// ---------------------------------------------------------------------------
// ConfigHandle
// ---------------------------------------------------------------------------

/// Shared, atomically swappable configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<EngineConfig>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// The configuration to use for one whole iteration.
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.load_full()
    }

    /// Install `next` with the following version number.
    pub fn replace(&self, mut next: EngineConfig) -> u64 {
        next.version = self.current.load().version + 1;
        let version = next.version;
        self.current.store(Arc::new(next));
        version
    }

    /// Re-read the environment.
    pub fn reload(&self) -> u64 {
        let version = self.replace(EngineConfig::from_env());
        tracing::info!(version, "Engine configuration reloaded");
        version
    }
}

/// Reload the configuration on every SIGHUP until `cancel` fires.
#[cfg(unix)]
pub async fn reload_on_sighup(handle: ConfigHandle, cancel: tokio_util::sync::CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install SIGHUP handler, config reload disabled");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                handle.reload();
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_sighup(_handle: ConfigHandle, cancel: tokio_util::sync::CancellationToken) {
    cancel.cancelled().await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
