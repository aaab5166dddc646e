//! PoolRotationScheduler: keeps exactly one eligible sub-pool active per
//! pool.
//!
//! Per pool, changes are serialized twice: in-process by an async mutex
//! and in the store by the `pools.version` guard on every swap. Pools are
//! independent of each other and rotate concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use numguard_core::event_types::{POOL_EXHAUSTED, POOL_REDISTRIBUTED, POOL_ROTATED};
use numguard_core::rotation::{plan_redistribution, plan_rotation, RotationPlan, SubPoolView};
use numguard_core::schedule::{directive_for, local_time, PoolSchedule, ScheduleDirective};
use numguard_core::types::{DbId, Timestamp};
use numguard_db::models::pool::Pool;
use numguard_events::{EventBus, PlatformEvent};
use serde_json::json;

use crate::config::EngineConfig;
use crate::daily::DailyMarker;
use crate::error::JobError;
use crate::store::EngineStore;
use crate::supervisor::PeriodicJob;

/// What one rotation pass did to a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    Applied {
        plan: RotationPlan,
        swapped: bool,
        moved: u64,
    },
    /// The pool version moved underneath us; the next tick re-reads it.
    Conflict,
    /// Rotation is turned off for the pool and the pass was not forced.
    Disabled,
}

/// Counts from one rotation tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub pools: usize,
    pub swapped: usize,
    pub exhausted: usize,
    pub conflicts: usize,
    pub failed: usize,
}

pub struct PoolRotationScheduler {
    store: Arc<dyn EngineStore>,
    bus: Arc<EventBus>,
    locks: Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>,
    /// Pools already reported as exhausted, so the alert fires once.
    exhausted: Mutex<HashSet<DbId>>,
}

impl PoolRotationScheduler {
    pub fn new(store: Arc<dyn EngineStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            locks: Mutex::new(HashMap::new()),
            exhausted: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    fn pool_lock(&self, pool_id: DbId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(pool_id).or_default())
    }

    async fn load_pool(&self, pool_id: DbId) -> Result<Pool, JobError> {
        self.store
            .find_pool(pool_id)
            .await?
            .ok_or(JobError::NotFound {
                entity: "pool",
                id: pool_id,
            })
    }

    /// Enabled schedules of a pool. Rows with an invalid window are logged
    /// and ignored.
    async fn schedules(&self, pool_id: DbId) -> Result<Vec<PoolSchedule>, JobError> {
        let rows = self.store.enabled_schedules(pool_id).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match PoolSchedule::try_from(row) {
                Ok(schedule) => Some(schedule),
                Err(e) => {
                    tracing::warn!(pool_id, schedule_id = row.id, error = %e, "Schedule ignored");
                    None
                }
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Bring one pool's activation in line with its schedules and
    /// eligibility. `force_advance` moves to the next eligible sub-pool even
    /// if the current one is still eligible.
    pub async fn rotate_pool(
        &self,
        cfg: &EngineConfig,
        pool_id: DbId,
        force_advance: bool,
        now: Timestamp,
    ) -> Result<RotationOutcome, JobError> {
        let lock = self.pool_lock(pool_id);
        let _guard = lock.lock().await;

        let pool = self.load_pool(pool_id).await?;
        if !pool.rotation_enabled && !force_advance {
            return Ok(RotationOutcome::Disabled);
        }
        let views = self.store.sub_pool_eligibility(pool_id).await?;
        let schedules = self.schedules(pool_id).await?;
        let directive = directive_for(&schedules, local_time(now, cfg.utc_offset));
        let plan = plan_rotation(&views, &directive, force_advance);

        let swapped = plan.requires_swap(&views);
        if swapped {
            match self.store.swap_active(pool.id, pool.version, plan.target).await? {
                Some(version) => {
                    tracing::info!(
                        pool_id,
                        from = ?plan.current,
                        to = ?plan.target,
                        reason = ?plan.reason,
                        version,
                        "Pool rotated"
                    );
                }
                None => {
                    tracing::debug!(pool_id, "Pool changed during rotation, skipped");
                    return Ok(RotationOutcome::Conflict);
                }
            }
            if plan.current != plan.target {
                self.publish(
                    &pool,
                    POOL_ROTATED,
                    now,
                    json!({ "from": plan.current, "to": plan.target, "reason": plan.reason }),
                );
            }
        }

        self.track_exhaustion(&pool, &plan, now);

        let moved = if cfg.redistribute && directive != ScheduleDirective::PoolOff {
            self.redistribute(&pool, &views, now).await?
        } else {
            0
        };

        Ok(RotationOutcome::Applied {
            plan,
            swapped,
            moved,
        })
    }

    fn track_exhaustion(&self, pool: &Pool, plan: &RotationPlan, now: Timestamp) {
        let newly_exhausted = {
            let mut exhausted = self.exhausted.lock().unwrap_or_else(PoisonError::into_inner);
            if plan.is_exhausted() {
                exhausted.insert(pool.id)
            } else {
                exhausted.remove(&pool.id);
                false
            }
        };
        if newly_exhausted {
            tracing::warn!(pool_id = pool.id, team_id = pool.team_id, "Pool exhausted");
            self.publish(
                pool,
                POOL_EXHAUSTED,
                now,
                json!({ "pool": pool.name, "previous": plan.current }),
            );
        }
    }

    async fn redistribute(
        &self,
        pool: &Pool,
        views: &[SubPoolView],
        now: Timestamp,
    ) -> Result<u64, JobError> {
        let mut total = 0;
        for transfer in plan_redistribution(views) {
            let moved = self
                .store
                .move_eligible(transfer.from_sub_pool_id, transfer.to_sub_pool_id, transfer.count)
                .await?;
            if moved == 0 {
                continue;
            }
            total += moved;
            tracing::info!(
                pool_id = pool.id,
                from = transfer.from_sub_pool_id,
                to = transfer.to_sub_pool_id,
                moved,
                "Numbers redistributed"
            );
            self.publish(
                pool,
                POOL_REDISTRIBUTED,
                now,
                json!({
                    "from": transfer.from_sub_pool_id,
                    "to": transfer.to_sub_pool_id,
                    "planned": transfer.count,
                    "moved": moved,
                }),
            );
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Manual actions
    // -----------------------------------------------------------------------

    /// Make `sub_pool_id` the only active sub-pool of its pool.
    pub async fn activate_sub_pool(&self, sub_pool_id: DbId, now: Timestamp) -> Result<bool, JobError> {
        let sub_pool = self
            .store
            .find_sub_pool(sub_pool_id)
            .await?
            .ok_or(JobError::NotFound {
                entity: "sub_pool",
                id: sub_pool_id,
            })?;

        let lock = self.pool_lock(sub_pool.pool_id);
        let _guard = lock.lock().await;

        let pool = self.load_pool(sub_pool.pool_id).await?;
        let views = self.store.sub_pool_eligibility(pool.id).await?;
        let current = views.iter().find(|v| v.active).map(|v| v.id);
        if views.iter().any(|v| v.id == sub_pool_id && !v.is_eligible()) {
            tracing::warn!(sub_pool_id, "Activating a sub-pool without eligible numbers");
        }

        if self
            .store
            .swap_active(pool.id, pool.version, Some(sub_pool_id))
            .await?
            .is_none()
        {
            return Ok(false);
        }
        tracing::info!(pool_id = pool.id, sub_pool_id, "Sub-pool activated manually");
        if current != Some(sub_pool_id) {
            self.publish(
                &pool,
                POOL_ROTATED,
                now,
                json!({ "from": current, "to": sub_pool_id, "reason": "manual" }),
            );
        }
        Ok(true)
    }

    /// Turn rotation off for a pool and deactivate all of its sub-pools.
    pub async fn deactivate_pool(&self, pool_id: DbId, now: Timestamp) -> Result<bool, JobError> {
        let lock = self.pool_lock(pool_id);
        let _guard = lock.lock().await;

        if !self.store.set_rotation_enabled(pool_id, false).await? {
            return Err(JobError::NotFound {
                entity: "pool",
                id: pool_id,
            });
        }
        let pool = self.load_pool(pool_id).await?;
        let views = self.store.sub_pool_eligibility(pool_id).await?;
        let current = views.iter().find(|v| v.active).map(|v| v.id);

        if current.is_some()
            && self
                .store
                .swap_active(pool.id, pool.version, None)
                .await?
                .is_none()
        {
            return Ok(false);
        }
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pool_id);

        tracing::info!(pool_id, "Pool deactivated manually");
        if current.is_some() {
            self.publish(
                &pool,
                POOL_ROTATED,
                now,
                json!({ "from": current, "to": null, "reason": "manual" }),
            );
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Ticks
    // -----------------------------------------------------------------------

    /// Rotate every rotation-enabled pool, up to `worker_concurrency` at a
    /// time.
    pub async fn rotate_all(&self, cfg: &EngineConfig, now: Timestamp) -> Result<TickReport, JobError> {
        let pools = self.store.list_rotating_pools().await?;
        let results: Vec<(DbId, Result<RotationOutcome, JobError>)> = stream::iter(pools)
            .map(|pool| async move { (pool.id, self.rotate_pool(cfg, pool.id, false, now).await) })
            .buffer_unordered(cfg.worker_concurrency)
            .collect()
            .await;

        let mut report = TickReport::default();
        for (pool_id, result) in results {
            report.pools += 1;
            match result {
                Ok(RotationOutcome::Applied { plan, swapped, .. }) => {
                    if swapped {
                        report.swapped += 1;
                    }
                    if plan.is_exhausted() {
                        report.exhausted += 1;
                    }
                }
                Ok(RotationOutcome::Conflict) => report.conflicts += 1,
                Ok(RotationOutcome::Disabled) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(pool_id, error = %e, "Pool rotation failed");
                }
            }
        }
        Ok(report)
    }

    fn publish(&self, pool: &Pool, event_type: &str, now: Timestamp, payload: serde_json::Value) {
        self.bus.publish(
            PlatformEvent::new(event_type)
                .with_source("pool", pool.id)
                .with_team(pool.team_id)
                .with_payload(payload)
                .at(now),
        );
    }
}

// ---------------------------------------------------------------------------
// rotation_tick job
// ---------------------------------------------------------------------------

/// The periodic rotation job. Defers while the daily activation for the
/// current day is due so the daily run always goes first.
pub struct RotationTick {
    scheduler: Arc<PoolRotationScheduler>,
    daily: Arc<DailyMarker>,
}

impl RotationTick {
    pub fn new(scheduler: Arc<PoolRotationScheduler>, daily: Arc<DailyMarker>) -> Self {
        Self { scheduler, daily }
    }
}

#[async_trait]
impl PeriodicJob for RotationTick {
    fn name(&self) -> &'static str {
        "rotation_tick"
    }

    fn cadence(&self, config: &EngineConfig) -> Duration {
        config.rotation_interval
    }

    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError> {
        if let Some(date) = self.daily.due(&config, now) {
            tracing::debug!(%date, "Rotation deferred until daily activation has run");
            return Ok(());
        }
        let report = self.scheduler.rotate_all(&config, now).await?;
        if report.swapped > 0 || report.failed > 0 {
            tracing::info!(
                pools = report.pools,
                swapped = report.swapped,
                exhausted = report.exhausted,
                conflicts = report.conflicts,
                failed = report.failed,
                "Rotation tick finished"
            );
        } else {
            tracing::debug!(pools = report.pools, "Rotation tick: no changes");
        }
        Ok(())
    }
}
