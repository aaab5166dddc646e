//! Snapshots of SIP result codes observed for a number.

use numguard_core::types::{DbId, SipCode, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `reasons_stats` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReasonsStat {
    pub id: DbId,
    pub number_id: DbId,
    pub window_from: Timestamp,
    pub window_to: Timestamp,
    pub sip_code: SipCode,
    pub sip_reason: Option<String>,
    pub count: i64,
    pub created_at: Timestamp,
}
