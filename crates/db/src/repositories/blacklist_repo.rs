//! Repository for the `blacklist` and `bl_logs` tables.

use numguard_core::types::DbId;
use sqlx::PgPool;

use crate::models::blacklist::{BlLog, BlacklistEntry};

const ENTRY_COLUMNS: &str = "id, number_id, team_id, filtered, created_at, updated_at";

const LOG_COLUMNS: &str = "id, blacklist_id, description, filtered, created_at";

pub struct BlacklistRepo;

impl BlacklistRepo {
    /// Upsert the (number, team) entry and append a log line, atomically.
    pub async fn record(
        pool: &PgPool,
        number_id: DbId,
        team_id: DbId,
        filtered: bool,
        description: &str,
    ) -> Result<BlLog, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let entry_query = format!(
            "INSERT INTO blacklist (number_id, team_id, filtered) VALUES ($1, $2, $3) \
             ON CONFLICT (number_id, team_id) DO UPDATE SET filtered = EXCLUDED.filtered \
             RETURNING {ENTRY_COLUMNS}"
        );
        let entry = sqlx::query_as::<_, BlacklistEntry>(&entry_query)
            .bind(number_id)
            .bind(team_id)
            .bind(filtered)
            .fetch_one(&mut *tx)
            .await?;

        let log_query = format!(
            "INSERT INTO bl_logs (blacklist_id, description, filtered) VALUES ($1, $2, $3) \
             RETURNING {LOG_COLUMNS}"
        );
        let log = sqlx::query_as::<_, BlLog>(&log_query)
            .bind(entry.id)
            .bind(description)
            .bind(filtered)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(log)
    }

    pub async fn find_entry(
        pool: &PgPool,
        number_id: DbId,
        team_id: DbId,
    ) -> Result<Option<BlacklistEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM blacklist WHERE number_id = $1 AND team_id = $2"
        );
        sqlx::query_as::<_, BlacklistEntry>(&query)
            .bind(number_id)
            .bind(team_id)
            .fetch_optional(pool)
            .await
    }

    /// Log lines of a number across teams, oldest first.
    pub async fn list_logs(pool: &PgPool, number_id: DbId) -> Result<Vec<BlLog>, sqlx::Error> {
        sqlx::query_as::<_, BlLog>(
            "SELECT l.id, l.blacklist_id, l.description, l.filtered, l.created_at \
             FROM bl_logs l JOIN blacklist b ON b.id = l.blacklist_id \
             WHERE b.number_id = $1 \
             ORDER BY l.created_at, l.id",
        )
        .bind(number_id)
        .fetch_all(pool)
        .await
    }
}
