//! Pool and sub-pool entities.

use numguard_core::rotation::SubPoolView;
use numguard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pools` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Pool {
    pub id: DbId,
    pub team_id: DbId,
    pub name: String,
    pub rotation_enabled: bool,
    /// Numbers loaded this many times are no longer eligible.
    pub load_ceiling: Option<i32>,
    /// Bumped by every activation change.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `sub_pools` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubPool {
    pub id: DbId,
    pub pool_id: DbId,
    pub name: String,
    pub priority: i32,
    pub active: bool,
    pub daily_loads: i32,
    pub activated_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A sub-pool with its count of eligible numbers.
#[derive(Debug, Clone, FromRow)]
pub struct SubPoolEligibility {
    pub id: DbId,
    pub priority: i32,
    pub active: bool,
    pub eligible_numbers: i64,
}

impl From<SubPoolEligibility> for SubPoolView {
    fn from(row: SubPoolEligibility) -> Self {
        SubPoolView {
            id: row.id,
            priority: row.priority,
            active: row.active,
            eligible_numbers: row.eligible_numbers,
        }
    }
}
