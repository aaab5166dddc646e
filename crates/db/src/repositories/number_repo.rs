//! Repository for the `numbers` table.
//!
//! Health writes are conditional on `version` so concurrent sweeps never
//! overwrite each other's transitions. The `stat_waiting` lease is keyed on
//! `stat_waiting_since`: only the holder that set it can release it.

use numguard_core::lifecycle::HealthSnapshot;
use numguard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::number::{CreateNumber, Number, NumberFilter};

/// Column list for `numbers` queries.
const COLUMNS: &str = "\
    id, number, team_id, pool_id, sub_pool_id, queue_id, client_id, \
    load_counter, attempts_counter, first_load_at, last_load_at, \
    success, blocked, blocked_at, stop_expired, recheck_since, block_count, \
    total_blocks, stat_waiting, stat_waiting_since, version, created_at, updated_at";

/// Provides number scans, lease handling and conditional health writes.
pub struct NumberRepo;

impl NumberRepo {
    /// Insert a new number, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateNumber) -> Result<Number, sqlx::Error> {
        let query = format!(
            "INSERT INTO numbers (number, team_id, pool_id, sub_pool_id, queue_id, client_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Number>(&query)
            .bind(&input.number)
            .bind(input.team_id)
            .bind(input.pool_id)
            .bind(input.sub_pool_id)
            .bind(input.queue_id)
            .bind(input.client_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Number>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM numbers WHERE id = $1");
        sqlx::query_as::<_, Number>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Bulk scan with optional predicates, ordered by id.
    pub async fn list_by_filter(
        pool: &PgPool,
        filter: &NumberFilter,
    ) -> Result<Vec<Number>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM numbers \
             WHERE ($1::BIGINT IS NULL OR team_id = $1) \
               AND ($2::BIGINT IS NULL OR pool_id = $2) \
               AND ($3::BIGINT IS NULL OR sub_pool_id = $3) \
               AND ($4::BOOLEAN IS NULL OR blocked = $4) \
               AND ($5::BOOLEAN IS NULL OR stat_waiting = $5) \
               AND ($6::BOOLEAN IS NULL OR (recheck_since IS NOT NULL) = $6) \
               AND ($7::BIGINT IS NULL OR id > $7) \
             ORDER BY id \
             LIMIT $8"
        );
        sqlx::query_as::<_, Number>(&query)
            .bind(filter.team_id)
            .bind(filter.pool_id)
            .bind(filter.sub_pool_id)
            .bind(filter.blocked)
            .bind(filter.stat_waiting)
            .bind(filter.in_recheck)
            .bind(filter.after_id)
            .bind(filter.limit)
            .fetch_all(pool)
            .await
    }

    /// Cooldown numbers whose `stop_expired` is at or before `now`.
    pub async fn list_cooldown_expired(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Number>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM numbers \
             WHERE blocked AND recheck_since IS NULL \
               AND stop_expired IS NOT NULL AND stop_expired <= $1 \
             ORDER BY stop_expired, id \
             LIMIT $2"
        );
        sqlx::query_as::<_, Number>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // stat_waiting lease
    // -----------------------------------------------------------------------

    /// Take the evaluation lease, returning the row as it was leased.
    ///
    /// Succeeds when no lease is held or the held one started before
    /// `stale_before`. Returns `None` when someone else holds a fresh lease.
    pub async fn acquire_lease(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<Option<Number>, sqlx::Error> {
        let query = format!(
            "UPDATE numbers SET stat_waiting = true, stat_waiting_since = $2 \
             WHERE id = $1 \
               AND (NOT stat_waiting OR stat_waiting_since < $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Number>(&query)
            .bind(id)
            .bind(now)
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    /// Release a lease without touching health. Returns `false` if the lease
    /// was already taken over by someone else.
    pub async fn release_lease(
        pool: &PgPool,
        id: DbId,
        leased_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE numbers SET stat_waiting = false, stat_waiting_since = NULL \
             WHERE id = $1 AND stat_waiting_since = $2",
        )
        .bind(id)
        .bind(leased_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear every lease older than `stale_before`. Returns how many.
    pub async fn clear_stale_leases(
        pool: &PgPool,
        stale_before: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE numbers SET stat_waiting = false, stat_waiting_since = NULL \
             WHERE stat_waiting AND stat_waiting_since < $1",
        )
        .bind(stale_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Health writes
    // -----------------------------------------------------------------------

    /// Persist health columns if the row is still at `expected_version`.
    ///
    /// `success` updates the last-known outcome when stats were obtained.
    /// When `leased_at` matches the held lease it is released in the same
    /// statement. Returns `false` on a version conflict.
    pub async fn apply_health(
        pool: &PgPool,
        id: DbId,
        expected_version: i64,
        health: &HealthSnapshot,
        success: Option<bool>,
        leased_at: Option<Timestamp>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE numbers SET \
                blocked = $3, \
                blocked_at = $4, \
                stop_expired = $5, \
                recheck_since = $6, \
                block_count = $7, \
                total_blocks = $8, \
                success = COALESCE($9, success), \
                stat_waiting = CASE WHEN stat_waiting_since = $10 THEN false ELSE stat_waiting END, \
                stat_waiting_since = CASE WHEN stat_waiting_since = $10 THEN NULL ELSE stat_waiting_since END, \
                version = version + 1 \
             WHERE id = $1 AND version = $2",
        )
        .bind(id)
        .bind(expected_version)
        .bind(health.blocked)
        .bind(health.blocked_at)
        .bind(health.stop_expired)
        .bind(health.recheck_since)
        .bind(health.block_count)
        .bind(health.total_blocks)
        .bind(success)
        .bind(leased_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Move up to `count` eligible numbers between two sub-pools of the same
    /// pool, least loaded first. Returns how many moved.
    pub async fn move_eligible(
        pool: &PgPool,
        from_sub_pool_id: DbId,
        to_sub_pool_id: DbId,
        count: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE numbers SET sub_pool_id = $2 \
             WHERE id IN ( \
                 SELECT n.id FROM numbers n \
                 JOIN sub_pools src ON src.id = n.sub_pool_id \
                 JOIN sub_pools dst ON dst.id = $2 AND dst.pool_id = src.pool_id \
                 JOIN pools p ON p.id = src.pool_id \
                 WHERE n.sub_pool_id = $1 \
                   AND NOT n.blocked \
                   AND (p.load_ceiling IS NULL OR n.load_counter < p.load_ceiling) \
                 ORDER BY n.load_counter, n.id \
                 LIMIT $3 \
                 FOR UPDATE OF n SKIP LOCKED)",
        )
        .bind(from_sub_pool_id)
        .bind(to_sub_pool_id)
        .bind(count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
