//! `daily_activation`: once per local day, reset sub-pool activation
//! counters and re-run selection for every rotating pool.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use numguard_core::schedule::daily_run_due;
use numguard_core::types::Timestamp;

use crate::config::EngineConfig;
use crate::error::JobError;
use crate::rotation::PoolRotationScheduler;
use crate::supervisor::PeriodicJob;

/// Local date of the last completed daily run, shared with the rotation
/// tick so it can defer to a pending daily run.
#[derive(Debug, Default)]
pub struct DailyMarker {
    last_run: Mutex<Option<NaiveDate>>,
}

impl DailyMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, date: NaiveDate) {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(date);
    }

    /// The local date whose run is due and not yet done.
    pub fn due(&self, cfg: &EngineConfig, now: Timestamp) -> Option<NaiveDate> {
        daily_run_due(now, cfg.daily_activation_at, cfg.utc_offset, self.last_run())
    }
}

pub struct DailyActivation {
    scheduler: Arc<PoolRotationScheduler>,
    marker: Arc<DailyMarker>,
}

impl DailyActivation {
    pub fn new(scheduler: Arc<PoolRotationScheduler>, marker: Arc<DailyMarker>) -> Self {
        Self { scheduler, marker }
    }

    /// Run the daily activation if it is due. Returns the local date it ran
    /// for.
    ///
    /// A failed counter reset leaves the day unmarked so the next check
    /// retries; individual pool failures do not.
    pub async fn run_if_due(
        &self,
        cfg: &EngineConfig,
        now: Timestamp,
    ) -> Result<Option<NaiveDate>, JobError> {
        let Some(date) = self.marker.due(cfg, now) else {
            return Ok(None);
        };

        let reset = self.scheduler.store().reset_daily_loads().await?;
        let report = self.scheduler.rotate_all(cfg, now).await?;
        self.marker.mark(date);

        tracing::info!(
            %date,
            sub_pools_reset = reset,
            pools = report.pools,
            swapped = report.swapped,
            exhausted = report.exhausted,
            failed = report.failed,
            "Daily activation finished"
        );
        Ok(Some(date))
    }
}

#[async_trait]
impl PeriodicJob for DailyActivation {
    fn name(&self) -> &'static str {
        "daily_activation"
    }

    fn cadence(&self, config: &EngineConfig) -> Duration {
        config.daily_check_interval
    }

    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError> {
        self.run_if_due(&config, now).await.map(|_| ())
    }
}
