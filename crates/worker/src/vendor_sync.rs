//! VendorSyncAgent: mirrors vendor queue reservations into
//! `vendor_reservations`.
//!
//! The vendor is authoritative for assignment; number health is never
//! touched here. A local row that was active but is now reserved remotely
//! by another owner raises `vendor.conflict`, once per change of owner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use numguard_core::event_types::VENDOR_CONFLICT;
use numguard_core::types::Timestamp;
use numguard_db::models::team::Team;
use numguard_events::{EventBus, PlatformEvent};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::JobError;
use crate::store::EngineStore;
use crate::supervisor::PeriodicJob;
use crate::vendor::{RemoteAssignment, VendorControl};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub teams: usize,
    pub queues: usize,
    pub failed_queues: usize,
    pub upserted: usize,
    pub deactivated: u64,
    pub conflicts: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.teams += other.teams;
        self.queues += other.queues;
        self.failed_queues += other.failed_queues;
        self.upserted += other.upserted;
        self.deactivated += other.deactivated;
        self.conflicts += other.conflicts;
    }
}

pub struct VendorSyncAgent {
    store: Arc<dyn EngineStore>,
    vendor: Arc<dyn VendorControl>,
    bus: Arc<EventBus>,
}

impl VendorSyncAgent {
    pub fn new(store: Arc<dyn EngineStore>, vendor: Arc<dyn VendorControl>, bus: Arc<EventBus>) -> Self {
        Self { store, vendor, bus }
    }

    /// Reconcile every active team that has vendor queues.
    pub async fn sync_all(&self, cfg: &EngineConfig, now: Timestamp) -> Result<SyncReport, JobError> {
        let teams = self.store.list_active_teams().await?;
        let mut report = SyncReport::default();
        for team in teams.iter().filter(|t| !t.webitel_queue_ids.is_empty()) {
            match self.sync_team(cfg, team, now).await {
                Ok(team_report) => report.absorb(team_report),
                Err(e) => {
                    tracing::warn!(team_id = team.id, error = %e, "Vendor sync failed for team");
                }
            }
        }
        Ok(report)
    }

    /// Reconcile one team. Local rows missing remotely are only deactivated
    /// when every queue of the team was fetched.
    pub async fn sync_team(
        &self,
        cfg: &EngineConfig,
        team: &Team,
        now: Timestamp,
    ) -> Result<SyncReport, JobError> {
        let local: HashMap<(i64, i64), LocalRow> = self
            .store
            .list_reservations(team.id)
            .await?
            .into_iter()
            .map(|r| {
                let row = LocalRow {
                    active: r.active,
                    reserved_by: r.reserved_by,
                };
                ((r.queue_id, r.resource_id), row)
            })
            .collect();

        let mut report = SyncReport {
            teams: 1,
            ..Default::default()
        };
        let mut present = Vec::new();

        for &queue_id in &team.webitel_queue_ids {
            report.queues += 1;
            let assignments = match self.vendor.queue_assignments(queue_id).await {
                Ok(assignments) => assignments,
                Err(e) => {
                    report.failed_queues += 1;
                    tracing::warn!(team_id = team.id, queue_id, error = %e, "Vendor queue fetch failed");
                    continue;
                }
            };

            for remote in assignments {
                let key = (remote.queue_id, remote.resource_id);
                present.push(key);
                if is_new_conflict(local.get(&key), &remote, &cfg.vendor_owner) {
                    report.conflicts += 1;
                    self.conflict(team, &remote, now);
                }
                self.store
                    .upsert_reservation(
                        team.id,
                        remote.queue_id,
                        remote.resource_id,
                        remote.reserved_by.as_deref(),
                        remote.active,
                        now,
                    )
                    .await?;
                report.upserted += 1;
            }
        }

        if report.failed_queues == 0 {
            report.deactivated = self
                .store
                .deactivate_missing_reservations(team.id, &present, now)
                .await?;
        }
        Ok(report)
    }

    fn conflict(&self, team: &Team, remote: &RemoteAssignment, now: Timestamp) {
        tracing::warn!(
            team_id = team.id,
            queue_id = remote.queue_id,
            resource_id = remote.resource_id,
            reserved_by = ?remote.reserved_by,
            "Vendor reservation held by another owner"
        );
        self.bus.publish(
            PlatformEvent::new(VENDOR_CONFLICT)
                .with_source("vendor_reservation", remote.resource_id)
                .with_team(team.id)
                .with_payload(json!({
                    "queue_id": remote.queue_id,
                    "resource_id": remote.resource_id,
                    "reserved_by": remote.reserved_by,
                }))
                .at(now),
        );
    }
}

struct LocalRow {
    active: bool,
    reserved_by: Option<String>,
}

fn held_elsewhere(remote: &RemoteAssignment, owner: &str) -> bool {
    remote.reserved_by.as_deref().is_some_and(|by| by != owner)
}

/// A foreign owner already mirrored locally was reported on an earlier sync.
fn is_new_conflict(local: Option<&LocalRow>, remote: &RemoteAssignment, owner: &str) -> bool {
    local.is_some_and(|row| row.active && row.reserved_by != remote.reserved_by)
        && held_elsewhere(remote, owner)
}

#[async_trait]
impl PeriodicJob for VendorSyncAgent {
    fn name(&self) -> &'static str {
        "vendor_sync"
    }

    fn cadence(&self, config: &EngineConfig) -> Duration {
        config.vendor_sync_interval
    }

    async fn tick(&self, config: Arc<EngineConfig>, now: Timestamp) -> Result<(), JobError> {
        let report = self.sync_all(&config, now).await?;
        if report.conflicts > 0 || report.deactivated > 0 || report.failed_queues > 0 {
            tracing::info!(
                teams = report.teams,
                queues = report.queues,
                failed_queues = report.failed_queues,
                upserted = report.upserted,
                deactivated = report.deactivated,
                conflicts = report.conflicts,
                "Vendor sync finished"
            );
        } else {
            tracing::debug!(teams = report.teams, upserted = report.upserted, "Vendor sync finished");
        }
        Ok(())
    }
}
