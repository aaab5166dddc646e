//! Repository for the `teams` table.

use numguard_core::types::DbId;
use sqlx::PgPool;

use crate::models::team::{CreateTeam, Team};

const COLUMNS: &str = "\
    id, name, active, filtration, email, stop_days, strategy, min_attempts, \
    cause_threshold, reblock_limit, escalate_stop_days, webitel_queue_ids, \
    bad_sip_codes, created_at, updated_at";

pub struct TeamRepo;

impl TeamRepo {
    pub async fn create(pool: &PgPool, input: &CreateTeam) -> Result<Team, sqlx::Error> {
        let query = format!(
            "INSERT INTO teams \
                (name, filtration, email, stop_days, strategy, bad_sip_codes, webitel_queue_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Team>(&query)
            .bind(&input.name)
            .bind(input.filtration)
            .bind(&input.email)
            .bind(input.stop_days)
            .bind(&input.strategy)
            .bind(&input.bad_sip_codes)
            .bind(&input.webitel_queue_ids)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams WHERE id = $1");
        sqlx::query_as::<_, Team>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active teams, ordered by id.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams WHERE active ORDER BY id");
        sqlx::query_as::<_, Team>(&query).fetch_all(pool).await
    }

    /// Active teams with blocking enabled.
    pub async fn list_filtering(pool: &PgPool) -> Result<Vec<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams WHERE active AND filtration ORDER BY id");
        sqlx::query_as::<_, Team>(&query).fetch_all(pool).await
    }
}
