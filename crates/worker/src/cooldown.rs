//! `cooldown_sweep`: moves expired cooldowns into recheck and recovers
//! stale evaluation leases.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use numguard_core::types::Timestamp;

use crate::config::EngineConfig;
use crate::error::JobError;
use crate::lifecycle::NumberLifecycleManager;
use crate::supervisor::PeriodicJob;

pub struct CooldownSweep {
    manager: Arc<NumberLifecycleManager>,
}

impl CooldownSweep {
    pub fn new(manager: Arc<NumberLifecycleManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl PeriodicJob for CooldownSweep {
    fn name(&self) -> &'static str {
        "cooldown_sweep"
    }

    fn cadence(&self, config: &EngineConfig) -> Duration {
        config.cooldown_interval
    }

    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError> {
        let report = self.manager.expire_cooldowns(&config, now).await?;
        if report.moved_to_recheck > 0 || report.failed > 0 {
            tracing::info!(
                moved = report.moved_to_recheck,
                conflicts = report.conflicts,
                failed = report.failed,
                "Cooldown sweep finished"
            );
        } else {
            tracing::debug!(conflicts = report.conflicts, "Cooldown sweep: nothing due");
        }
        Ok(())
    }
}
