//! Blacklist entries and their append-only filtering log.

use numguard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `blacklist` table. One per (number, team).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BlacklistEntry {
    pub id: DbId,
    pub number_id: DbId,
    pub team_id: DbId,
    /// Whether the number is currently filtered out.
    pub filtered: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `bl_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BlLog {
    pub id: DbId,
    pub blacklist_id: DbId,
    pub description: String,
    pub filtered: bool,
    pub created_at: Timestamp,
}
