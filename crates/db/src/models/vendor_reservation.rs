use numguard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `vendor_reservations` table: a queue resource held at the
/// external vendor on behalf of a team.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VendorReservation {
    pub id: DbId,
    pub team_id: DbId,
    pub queue_id: i64,
    pub resource_id: i64,
    pub reserved_by: Option<String>,
    pub active: bool,
    pub synced_at: Timestamp,
    pub created_at: Timestamp,
}
