//! Repository for the `vendor_reservations` table.

use numguard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::vendor_reservation::VendorReservation;

const COLUMNS: &str =
    "id, team_id, queue_id, resource_id, reserved_by, active, synced_at, created_at";

pub struct VendorReservationRepo;

impl VendorReservationRepo {
    pub async fn list_for_team(
        pool: &PgPool,
        team_id: DbId,
    ) -> Result<Vec<VendorReservation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM vendor_reservations WHERE team_id = $1 \
             ORDER BY queue_id, resource_id"
        );
        sqlx::query_as::<_, VendorReservation>(&query)
            .bind(team_id)
            .fetch_all(pool)
            .await
    }

    /// Insert or overwrite a reservation with the remote view.
    pub async fn upsert(
        pool: &PgPool,
        team_id: DbId,
        queue_id: i64,
        resource_id: i64,
        reserved_by: Option<&str>,
        active: bool,
        synced_at: Timestamp,
    ) -> Result<VendorReservation, sqlx::Error> {
        let query = format!(
            "INSERT INTO vendor_reservations \
                (team_id, queue_id, resource_id, reserved_by, active, synced_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (queue_id, resource_id) DO UPDATE SET \
                team_id = EXCLUDED.team_id, \
                reserved_by = EXCLUDED.reserved_by, \
                active = EXCLUDED.active, \
                synced_at = EXCLUDED.synced_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VendorReservation>(&query)
            .bind(team_id)
            .bind(queue_id)
            .bind(resource_id)
            .bind(reserved_by)
            .bind(active)
            .bind(synced_at)
            .fetch_one(pool)
            .await
    }

    /// Deactivate the team's active reservations absent from `present`
    /// (pairs of queue id and resource id). Returns how many.
    pub async fn deactivate_missing(
        pool: &PgPool,
        team_id: DbId,
        present: &[(i64, i64)],
        synced_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let queues: Vec<i64> = present.iter().map(|p| p.0).collect();
        let resources: Vec<i64> = present.iter().map(|p| p.1).collect();
        let result = sqlx::query(
            "UPDATE vendor_reservations SET active = false, synced_at = $4 \
             WHERE team_id = $1 AND active \
               AND (queue_id, resource_id) NOT IN ( \
                   SELECT q, r FROM UNNEST($2::BIGINT[], $3::BIGINT[]) AS p(q, r))",
        )
        .bind(team_id)
        .bind(&queues)
        .bind(&resources)
        .bind(synced_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
