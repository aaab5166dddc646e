//! Repository for the `pools` and `sub_pools` tables.
//!
//! Activation changes go through [`PoolRepo::swap_active`], a single
//! transaction guarded by `pools.version`.

use numguard_core::types::DbId;
use sqlx::PgPool;

use crate::models::pool::{Pool, SubPool, SubPoolEligibility};

const POOL_COLUMNS: &str =
    "id, team_id, name, rotation_enabled, load_ceiling, version, created_at, updated_at";

const SUB_POOL_COLUMNS: &str =
    "id, pool_id, name, priority, active, daily_loads, activated_at, created_at, updated_at";

pub struct PoolRepo;

impl PoolRepo {
    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    pub async fn create(
        pool: &PgPool,
        team_id: DbId,
        name: &str,
        load_ceiling: Option<i32>,
    ) -> Result<Pool, sqlx::Error> {
        let query = format!(
            "INSERT INTO pools (team_id, name, load_ceiling) VALUES ($1, $2, $3) \
             RETURNING {POOL_COLUMNS}"
        );
        sqlx::query_as::<_, Pool>(&query)
            .bind(team_id)
            .bind(name)
            .bind(load_ceiling)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Pool>, sqlx::Error> {
        let query = format!("SELECT {POOL_COLUMNS} FROM pools WHERE id = $1");
        sqlx::query_as::<_, Pool>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rotation-enabled pools of active teams.
    pub async fn list_rotating(pool: &PgPool) -> Result<Vec<Pool>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM pools p \
             JOIN teams t ON t.id = p.team_id \
             WHERE p.rotation_enabled AND t.active \
             ORDER BY p.id",
            prefixed(POOL_COLUMNS, "p")
        );
        sqlx::query_as::<_, Pool>(&query).fetch_all(pool).await
    }

    // -----------------------------------------------------------------------
    // Sub-pools
    // -----------------------------------------------------------------------

    pub async fn create_sub_pool(
        pool: &PgPool,
        pool_id: DbId,
        name: &str,
        priority: i32,
    ) -> Result<SubPool, sqlx::Error> {
        let query = format!(
            "INSERT INTO sub_pools (pool_id, name, priority) VALUES ($1, $2, $3) \
             RETURNING {SUB_POOL_COLUMNS}"
        );
        sqlx::query_as::<_, SubPool>(&query)
            .bind(pool_id)
            .bind(name)
            .bind(priority)
            .fetch_one(pool)
            .await
    }

    pub async fn find_sub_pool(pool: &PgPool, id: DbId) -> Result<Option<SubPool>, sqlx::Error> {
        let query = format!("SELECT {SUB_POOL_COLUMNS} FROM sub_pools WHERE id = $1");
        sqlx::query_as::<_, SubPool>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Sub-pools of a pool in rotation order.
    pub async fn list_sub_pools(pool: &PgPool, pool_id: DbId) -> Result<Vec<SubPool>, sqlx::Error> {
        let query = format!(
            "SELECT {SUB_POOL_COLUMNS} FROM sub_pools WHERE pool_id = $1 ORDER BY priority, id"
        );
        sqlx::query_as::<_, SubPool>(&query)
            .bind(pool_id)
            .fetch_all(pool)
            .await
    }

    /// Every sub-pool of a pool with its count of unblocked numbers under
    /// the pool's load ceiling.
    pub async fn sub_pool_eligibility(
        pool: &PgPool,
        pool_id: DbId,
    ) -> Result<Vec<SubPoolEligibility>, sqlx::Error> {
        sqlx::query_as::<_, SubPoolEligibility>(
            "SELECT sp.id, sp.priority, sp.active, \
                    COUNT(n.id) FILTER ( \
                        WHERE NOT n.blocked \
                          AND (p.load_ceiling IS NULL OR n.load_counter < p.load_ceiling) \
                    ) AS eligible_numbers \
             FROM sub_pools sp \
             JOIN pools p ON p.id = sp.pool_id \
             LEFT JOIN numbers n ON n.sub_pool_id = sp.id \
             WHERE sp.pool_id = $1 \
             GROUP BY sp.id, sp.priority, sp.active \
             ORDER BY sp.priority, sp.id",
        )
        .bind(pool_id)
        .fetch_all(pool)
        .await
    }

    /// Make `target` the only active sub-pool of `pool_id` (or none).
    ///
    /// Returns the new pool version, or `None` if the pool moved past
    /// `expected_version` in the meantime. Readers never see two active
    /// sub-pools nor an intermediate empty set.
    pub async fn swap_active(
        pool: &PgPool,
        pool_id: DbId,
        expected_version: i64,
        target: Option<DbId>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE pools SET version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING version",
        )
        .bind(pool_id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = version else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE sub_pools SET active = false \
             WHERE pool_id = $1 AND active AND id IS DISTINCT FROM $2",
        )
        .bind(pool_id)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        if let Some(target) = target {
            sqlx::query(
                "UPDATE sub_pools SET active = true, activated_at = NOW(), \
                    daily_loads = daily_loads + 1 \
                 WHERE id = $1 AND pool_id = $2 AND NOT active",
            )
            .bind(target)
            .bind(pool_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(version))
    }

    /// Turn periodic rotation of a pool on or off. Returns `false` for an
    /// unknown pool.
    pub async fn set_rotation_enabled(
        pool: &PgPool,
        pool_id: DbId,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE pools SET rotation_enabled = $2 WHERE id = $1")
            .bind(pool_id)
            .bind(enabled)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Zero the per-day activation counters of every rotating pool.
    pub async fn reset_daily_loads(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sub_pools sp SET daily_loads = 0 \
             FROM pools p JOIN teams t ON t.id = p.team_id \
             WHERE sp.pool_id = p.id AND p.rotation_enabled AND t.active \
               AND sp.daily_loads <> 0",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Qualify a comma-separated column list with a table alias.
fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_qualifies_every_column() {
        assert_eq!(prefixed("id, name,version", "p"), "p.id, p.name, p.version");
    }
}
