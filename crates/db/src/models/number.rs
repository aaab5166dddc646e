//! Number entity and the filters used to scan it.

use numguard_core::error::CoreError;
use numguard_core::lifecycle::{HealthSnapshot, NumberState};
use numguard_core::phone::normalize_e164;
use numguard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `numbers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Number {
    pub id: DbId,
    pub number: String,
    pub team_id: Option<DbId>,
    pub pool_id: Option<DbId>,
    pub sub_pool_id: Option<DbId>,
    pub queue_id: Option<i64>,
    pub client_id: Option<i64>,
    pub load_counter: i64,
    pub attempts_counter: i64,
    pub first_load_at: Option<Timestamp>,
    pub last_load_at: Option<Timestamp>,
    pub success: bool,
    pub blocked: bool,
    pub blocked_at: Option<Timestamp>,
    pub stop_expired: Option<Timestamp>,
    pub recheck_since: Option<Timestamp>,
    /// Consecutive blocks since the last release.
    pub block_count: i32,
    pub total_blocks: i32,
    pub stat_waiting: bool,
    pub stat_waiting_since: Option<Timestamp>,
    /// Bumped by every health write; conditional updates key on it.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Number {
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            blocked: self.blocked,
            blocked_at: self.blocked_at,
            stop_expired: self.stop_expired,
            recheck_since: self.recheck_since,
            block_count: self.block_count,
            total_blocks: self.total_blocks,
        }
    }

    pub fn state(&self) -> NumberState {
        self.health().state()
    }
}

/// Optional predicates for bulk number scans. `None` matches anything.
#[derive(Debug, Clone, Default)]
pub struct NumberFilter {
    pub team_id: Option<DbId>,
    pub pool_id: Option<DbId>,
    pub sub_pool_id: Option<DbId>,
    pub blocked: Option<bool>,
    pub stat_waiting: Option<bool>,
    /// Only numbers in `PendingRecheck` (`true`) or outside it (`false`).
    pub in_recheck: Option<bool>,
    /// Keyset cursor: only ids greater than this.
    pub after_id: Option<DbId>,
    pub limit: Option<i64>,
}

/// Fields for inserting a number.
#[derive(Debug, Clone)]
pub struct CreateNumber {
    /// E.164 form; use [`CreateNumber::new`] to normalize raw input.
    pub number: String,
    pub team_id: Option<DbId>,
    pub pool_id: Option<DbId>,
    pub sub_pool_id: Option<DbId>,
    pub queue_id: Option<i64>,
    pub client_id: Option<i64>,
}

impl CreateNumber {
    /// An unassigned number, normalized to E.164.
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        Ok(Self {
            number: normalize_e164(raw)?,
            team_id: None,
            pool_id: None,
            sub_pool_id: None,
            queue_id: None,
            client_id: None,
        })
    }

    pub fn in_sub_pool(mut self, team_id: DbId, pool_id: DbId, sub_pool_id: DbId) -> Self {
        self.team_id = Some(team_id);
        self.pool_id = Some(pool_id);
        self.sub_pool_id = Some(sub_pool_id);
        self
    }
}
