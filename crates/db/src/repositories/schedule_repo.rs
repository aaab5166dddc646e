//! Repository for the `schedules` table. Read-only for the engine.

use chrono::NaiveTime;
use numguard_core::types::DbId;
use sqlx::PgPool;

use crate::models::schedule::Schedule;

const COLUMNS: &str = "\
    id, pool_id, sub_pool_id, name, starts_at, ends_at, days_of_week, enabled, \
    created_at, updated_at";

pub struct ScheduleRepo;

impl ScheduleRepo {
    /// Enabled schedules of a pool, ordered by id.
    pub async fn list_enabled_for_pool(
        pool: &PgPool,
        pool_id: DbId,
    ) -> Result<Vec<Schedule>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM schedules WHERE pool_id = $1 AND enabled ORDER BY id");
        sqlx::query_as::<_, Schedule>(&query)
            .bind(pool_id)
            .fetch_all(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        pool_id: DbId,
        sub_pool_id: Option<DbId>,
        name: &str,
        starts_at: NaiveTime,
        ends_at: NaiveTime,
        days_of_week: &[i16],
    ) -> Result<Schedule, sqlx::Error> {
        let query = format!(
            "INSERT INTO schedules (pool_id, sub_pool_id, name, starts_at, ends_at, days_of_week) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Schedule>(&query)
            .bind(pool_id)
            .bind(sub_pool_id)
            .bind(name)
            .bind(starts_at)
            .bind(ends_at)
            .bind(days_of_week)
            .fetch_one(pool)
            .await
    }
}
