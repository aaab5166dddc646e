//! `strategy_sweep`: evaluates every dialable and every rechecking number
//! of every filtering team.
//!
//! Numbers are processed concurrently up to `worker_concurrency`. A team
//! with an unusable strategy is skipped with one warning per sweep; a
//! number whose evaluation fails is skipped until the next sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use numguard_core::types::{DbId, Timestamp};
use numguard_db::models::number::{Number, NumberFilter};

use crate::config::EngineConfig;
use crate::error::JobError;
use crate::lifecycle::{sweepable, Evaluation, NumberLifecycleManager, TeamContext};
use crate::supervisor::PeriodicJob;

/// Counts from one strategy sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub teams: usize,
    pub misconfigured_teams: usize,
    pub evaluated: usize,
    pub blocked: usize,
    pub released: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, result: Result<Evaluation, JobError>, number_id: DbId) {
        match result {
            Ok(Evaluation::Blocked { .. }) => {
                self.evaluated += 1;
                self.blocked += 1;
            }
            Ok(Evaluation::Released) => {
                self.evaluated += 1;
                self.released += 1;
            }
            Ok(Evaluation::Unchanged) => self.evaluated += 1,
            Ok(Evaluation::LeaseHeld | Evaluation::Conflict) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(number_id, error = %e, "Number evaluation failed, retrying next sweep");
            }
        }
    }
}

pub struct StrategySweep {
    manager: Arc<NumberLifecycleManager>,
}

impl StrategySweep {
    pub fn new(manager: Arc<NumberLifecycleManager>) -> Self {
        Self { manager }
    }

    /// Run one full sweep.
    pub async fn sweep(&self, cfg: &EngineConfig, now: Timestamp) -> Result<SweepReport, JobError> {
        let store = self.manager.store();
        let teams = store.list_filtering_teams().await?;
        let mut report = SweepReport::default();

        for team in teams {
            report.teams += 1;
            let team_id = team.id;
            let ctx = match TeamContext::new(team, cfg.max_stop_days) {
                Ok(ctx) => ctx,
                Err(e) => {
                    report.misconfigured_teams += 1;
                    tracing::warn!(team_id, error = %e, "Team skipped: blocking strategy unusable");
                    continue;
                }
            };

            let candidates = match self.candidates(cfg, team_id).await {
                Ok(numbers) => numbers,
                Err(e) => {
                    tracing::error!(team_id, error = %e, "Failed to list numbers for team");
                    continue;
                }
            };

            let ctx = &ctx;
            let results: Vec<(DbId, Result<Evaluation, JobError>)> = stream::iter(candidates)
                .map(|number| async move {
                    let id = number.id;
                    (id, self.manager.evaluate_number(cfg, ctx, id, false, now).await)
                })
                .buffer_unordered(cfg.worker_concurrency)
                .collect()
                .await;

            for (number_id, result) in results {
                report.record(result, number_id);
            }
        }

        Ok(report)
    }

    /// Unleased numbers of a team that are Active or PendingRecheck, read
    /// page by page.
    async fn candidates(&self, cfg: &EngineConfig, team_id: DbId) -> Result<Vec<Number>, JobError> {
        let store = self.manager.store();
        let mut out = Vec::new();
        let selections = [
            NumberFilter {
                blocked: Some(false),
                ..Default::default()
            },
            NumberFilter {
                in_recheck: Some(true),
                ..Default::default()
            },
        ];

        for selection in selections {
            let mut after_id = None;
            loop {
                let page = store
                    .list_numbers(&NumberFilter {
                        team_id: Some(team_id),
                        stat_waiting: Some(false),
                        after_id,
                        limit: Some(cfg.sweep_batch_size),
                        ..selection.clone()
                    })
                    .await?;
                let full = page.len() as i64 >= cfg.sweep_batch_size;
                after_id = page.last().map(|n| n.id);
                out.extend(page.into_iter().filter(|n| sweepable(n.state())));
                if !full {
                    break;
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PeriodicJob for StrategySweep {
    fn name(&self) -> &'static str {
        "strategy_sweep"
    }

    fn cadence(&self, config: &EngineConfig) -> Duration {
        config.strategy_interval
    }

    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError> {
        let report = self.sweep(&config, now).await?;
        if report.blocked > 0 || report.released > 0 || report.failed > 0 {
            tracing::info!(
                teams = report.teams,
                evaluated = report.evaluated,
                blocked = report.blocked,
                released = report.released,
                skipped = report.skipped,
                failed = report.failed,
                "Strategy sweep finished"
            );
        } else {
            tracing::debug!(
                teams = report.teams,
                evaluated = report.evaluated,
                "Strategy sweep finished without changes"
            );
        }
        Ok(())
    }
}
