//! Repository for the `reasons_stats` table.

use numguard_core::strategy::ReasonCount;
use numguard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::reasons_stat::ReasonsStat;

const COLUMNS: &str =
    "id, number_id, window_from, window_to, sip_code, sip_reason, count, created_at";

pub struct ReasonsStatRepo;

impl ReasonsStatRepo {
    /// Store the SIP code breakdown of one evaluation window.
    pub async fn insert_snapshot(
        pool: &PgPool,
        number_id: DbId,
        window_from: Timestamp,
        window_to: Timestamp,
        reasons: &[ReasonCount],
    ) -> Result<u64, sqlx::Error> {
        if reasons.is_empty() {
            return Ok(0);
        }
        let codes: Vec<i32> = reasons.iter().map(|r| r.sip_code).collect();
        let texts: Vec<Option<String>> = reasons.iter().map(|r| r.sip_reason.clone()).collect();
        let counts: Vec<i64> = reasons
            .iter()
            .map(|r| i64::try_from(r.count).unwrap_or(i64::MAX))
            .collect();

        let result = sqlx::query(
            "INSERT INTO reasons_stats (number_id, window_from, window_to, sip_code, sip_reason, count) \
             SELECT $1, $2, $3, code, reason, cnt \
             FROM UNNEST($4::INT[], $5::TEXT[], $6::BIGINT[]) AS r(code, reason, cnt)",
        )
        .bind(number_id)
        .bind(window_from)
        .bind(window_to)
        .bind(&codes)
        .bind(&texts)
        .bind(&counts)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Most recent snapshot rows of a number, newest window first.
    pub async fn list_for_number(
        pool: &PgPool,
        number_id: DbId,
        limit: i64,
    ) -> Result<Vec<ReasonsStat>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM reasons_stats WHERE number_id = $1 \
             ORDER BY window_to DESC, id LIMIT $2"
        );
        sqlx::query_as::<_, ReasonsStat>(&query)
            .bind(number_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
