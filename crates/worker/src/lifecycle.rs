//! NumberLifecycleManager: applies strategy verdicts and cooldown expiry to
//! stored numbers.
//!
//! Every evaluation runs under the `stat_waiting` lease and persists its
//! result with a version-guarded write that releases the lease in the same
//! statement. Losing that race means somebody else already moved the
//! number; it is skipped, not reported.

use std::sync::Arc;

use numguard_core::event_types::{
    NUMBER_BLOCKED, NUMBER_HELD, NUMBER_RECHECK_PENDING, NUMBER_RELEASED,
};
use numguard_core::lifecycle::{
    plan_cooldown_expiry, plan_transition, recheck_grace_elapsed, CooldownPolicy, NumberState,
    Transition,
};
use numguard_core::strategy::{evaluate, CallStats, StrategyPolicy, Verdict};
use numguard_core::types::{DbId, Timestamp};
use numguard_db::models::number::Number;
use numguard_db::models::team::Team;
use numguard_events::{EventBus, PlatformEvent};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::JobError;
use crate::stats::StatSource;
use crate::store::EngineStore;

const RECHECK_GRACE_REASON: &str = "recheck grace elapsed";

/// A team's validated blocking configuration, built once per sweep.
#[derive(Debug, Clone)]
pub struct TeamContext {
    pub team: Team,
    pub strategy: StrategyPolicy,
    pub cooldown: CooldownPolicy,
}

impl TeamContext {
    pub fn new(team: Team, max_stop_days: i32) -> Result<Self, JobError> {
        let strategy = team
            .strategy_policy()
            .map_err(|e| JobError::Config(format!("team {}: {e}", team.id)))?;
        let cooldown = team.cooldown_policy(max_stop_days);
        Ok(Self {
            team,
            strategy,
            cooldown,
        })
    }
}

/// What one evaluation did to a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Another evaluation holds a fresh lease.
    LeaseHeld,
    /// The number changed underneath us.
    Conflict,
    /// Health is unchanged (last success flag may have been refreshed).
    Unchanged,
    Blocked { reblock: bool, held: bool },
    Released,
}

/// Counts from one cooldown sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CooldownReport {
    pub stale_leases: u64,
    pub moved_to_recheck: usize,
    pub conflicts: usize,
    pub failed: usize,
}

pub struct NumberLifecycleManager {
    store: Arc<dyn EngineStore>,
    stats: Arc<dyn StatSource>,
    bus: Arc<EventBus>,
}

impl NumberLifecycleManager {
    pub fn new(store: Arc<dyn EngineStore>, stats: Arc<dyn StatSource>, bus: Arc<EventBus>) -> Self {
        Self { store, stats, bus }
    }

    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Strategy evaluation
    // -----------------------------------------------------------------------

    /// Evaluate one number of `ctx.team` against a fresh stat window.
    ///
    /// `force` evaluates even if another evaluation holds the lease. The
    /// held lease is bypassed, not taken: its holder keeps it and loses the
    /// version race instead. On any error our own lease is released and
    /// health is left untouched.
    pub async fn evaluate_number(
        &self,
        cfg: &EngineConfig,
        ctx: &TeamContext,
        number_id: DbId,
        force: bool,
        now: Timestamp,
    ) -> Result<Evaluation, JobError> {
        let leased = self
            .store
            .acquire_lease(number_id, now, now - cfg.lease_ttl)
            .await?;
        let (number, lease) = match leased {
            Some(number) => {
                let leased_at = number.stat_waiting_since.unwrap_or(now);
                (number, Some(leased_at))
            }
            None if force => {
                let number = self
                    .store
                    .find_number(number_id)
                    .await?
                    .ok_or(JobError::NotFound {
                        entity: "number",
                        id: number_id,
                    })?;
                tracing::info!(number_id, "Forced evaluation bypasses the held lease");
                (number, None)
            }
            None => {
                tracing::debug!(number_id, "Number already under evaluation, skipped");
                return Ok(Evaluation::LeaseHeld);
            }
        };

        if number.team_id != Some(ctx.team.id) {
            self.release(number_id, lease).await;
            return Err(JobError::Inconsistent(format!(
                "number {number_id} belongs to team {:?}, evaluated for team {}",
                number.team_id, ctx.team.id
            )));
        }

        let window_from = now - cfg.stat_window;
        let stats = match self
            .stats
            .get_call_stats(&number.number, window_from, now)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                self.release(number_id, lease).await;
                return Err(e.into());
            }
        };

        let health = number.health();
        let state = health.state();
        let mut verdict = evaluate(&ctx.strategy, state.evaluation_phase(), &stats);
        let mut grace_release = false;
        if verdict == Verdict::NoChange && recheck_grace_elapsed(&health, cfg.recheck_grace, now) {
            verdict = Verdict::Clear;
            grace_release = true;
        }

        let transition = plan_transition(&health, &verdict, &ctx.cooldown, now);
        let next = transition.apply(&health);
        if let Err(e) = next.check_invariants() {
            self.release(number_id, lease).await;
            return Err(JobError::Inconsistent(format!("number {number_id}: {e}")));
        }

        let applied = match self
            .store
            .apply_health(
                number_id,
                number.version,
                &next,
                Some(stats.success_count > 0),
                lease,
            )
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                self.release(number_id, lease).await;
                return Err(e.into());
            }
        };
        if !applied {
            self.release(number_id, lease).await;
            tracing::debug!(number_id, "Number changed during evaluation, skipped");
            return Ok(Evaluation::Conflict);
        }

        let outcome = match transition {
            Transition::Block {
                stop_expired,
                block_count,
                reblock,
                ..
            } => {
                let reason = match &verdict {
                    Verdict::Block(reason) => reason.to_string(),
                    _ => String::new(),
                };
                self.on_blocked(&number, &reason, window_from, now, &stats).await;
                let held = stop_expired.is_none();
                let event_type = if held { NUMBER_HELD } else { NUMBER_BLOCKED };
                self.publish(
                    &number,
                    event_type,
                    now,
                    json!({
                        "number": number.number,
                        "reason": reason,
                        "strategy": ctx.strategy.kind,
                        "block_count": block_count,
                        "stop_expired": stop_expired,
                        "reblock": reblock,
                    }),
                );
                tracing::info!(
                    number_id,
                    team_id = ctx.team.id,
                    %reason,
                    reblock,
                    held,
                    "Number blocked"
                );
                Evaluation::Blocked { reblock, held }
            }
            Transition::Release => {
                let reason = if grace_release {
                    RECHECK_GRACE_REASON.to_string()
                } else {
                    format!("{}: recheck passed", ctx.strategy.kind)
                };
                self.audit(&number, false, &reason).await;
                self.publish(
                    &number,
                    NUMBER_RELEASED,
                    now,
                    json!({ "number": number.number, "reason": reason, "from": state }),
                );
                tracing::info!(number_id, team_id = ctx.team.id, %reason, "Number released");
                Evaluation::Released
            }
            Transition::None | Transition::BeginRecheck { .. } => Evaluation::Unchanged,
        };
        Ok(outcome)
    }

    /// Operator-requested recheck: loads the number's team and evaluates it
    /// regardless of state or lease.
    pub async fn force_recheck(
        &self,
        cfg: &EngineConfig,
        number_id: DbId,
        now: Timestamp,
    ) -> Result<Evaluation, JobError> {
        let number = self
            .store
            .find_number(number_id)
            .await?
            .ok_or(JobError::NotFound {
                entity: "number",
                id: number_id,
            })?;
        let team_id = number.team_id.ok_or_else(|| {
            JobError::Inconsistent(format!("number {number_id} has no team"))
        })?;
        let team = self
            .store
            .find_team(team_id)
            .await?
            .ok_or_else(|| JobError::Inconsistent(format!(
                "number {number_id} references missing team {team_id}"
            )))?;
        let ctx = TeamContext::new(team, cfg.max_stop_days)?;
        self.evaluate_number(cfg, &ctx, number_id, true, now).await
    }

    // -----------------------------------------------------------------------
    // Cooldown expiry
    // -----------------------------------------------------------------------

    /// Clear stale leases, then move every cooldown whose timer ran out into
    /// recheck. Per-number failures are counted, not returned.
    pub async fn expire_cooldowns(
        &self,
        cfg: &EngineConfig,
        now: Timestamp,
    ) -> Result<CooldownReport, JobError> {
        let mut report = CooldownReport {
            stale_leases: self.store.clear_stale_leases(now - cfg.lease_ttl).await?,
            ..Default::default()
        };
        if report.stale_leases > 0 {
            tracing::warn!(count = report.stale_leases, "Cleared stale stat_waiting leases");
        }

        let due = self
            .store
            .list_cooldown_expired(now, cfg.sweep_batch_size)
            .await?;

        for number in due {
            let health = number.health();
            let transition = plan_cooldown_expiry(&health, now);
            if transition.is_none() {
                continue;
            }
            let next = transition.apply(&health);
            match self
                .store
                .apply_health(number.id, number.version, &next, None, None)
                .await
            {
                Ok(true) => {
                    report.moved_to_recheck += 1;
                    self.publish(
                        &number,
                        NUMBER_RECHECK_PENDING,
                        now,
                        json!({
                            "number": number.number,
                            "stop_expired": number.stop_expired,
                            "block_count": number.block_count,
                        }),
                    );
                }
                Ok(false) => report.conflicts += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(number_id = number.id, error = %e, "Cooldown expiry failed");
                }
            }
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Give back the lease taken at `lease`, if this evaluation holds one.
    async fn release(&self, number_id: DbId, lease: Option<Timestamp>) {
        let Some(leased_at) = lease else {
            return;
        };
        match self.store.release_lease(number_id, leased_at).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(number_id, "Lease already taken over"),
            Err(e) => tracing::warn!(number_id, error = %e, "Failed to release lease"),
        }
    }

    async fn on_blocked(
        &self,
        number: &Number,
        reason: &str,
        window_from: Timestamp,
        window_to: Timestamp,
        stats: &CallStats,
    ) {
        if !stats.reasons.is_empty() {
            if let Err(e) = self
                .store
                .record_reasons(number.id, window_from, window_to, &stats.reasons)
                .await
            {
                tracing::warn!(number_id = number.id, error = %e, "Failed to record reason stats");
            }
        }
        self.audit(number, true, reason).await;
    }

    async fn audit(&self, number: &Number, filtered: bool, description: &str) {
        let Some(team_id) = number.team_id else {
            return;
        };
        if let Err(e) = self
            .store
            .record_blacklist(number.id, team_id, filtered, description)
            .await
        {
            tracing::warn!(number_id = number.id, error = %e, "Failed to write blacklist log");
        }
    }

    fn publish(&self, number: &Number, event_type: &str, now: Timestamp, payload: serde_json::Value) {
        let mut event = PlatformEvent::new(event_type)
            .with_source("number", number.id)
            .with_payload(payload)
            .at(now);
        if let Some(team_id) = number.team_id {
            event = event.with_team(team_id);
        }
        self.bus.publish(event);
    }
}

/// States the periodic strategy sweep evaluates.
pub fn sweepable(state: NumberState) -> bool {
    matches!(state, NumberState::Active | NumberState::PendingRecheck)
}
