//! Schedule entity: a recurring window during which a pool or one of its
//! sub-pools should be active.

use chrono::NaiveTime;
use numguard_core::error::CoreError;
use numguard_core::schedule::{PoolSchedule, ScheduleWindow};
use numguard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `schedules` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Schedule {
    pub id: DbId,
    pub pool_id: DbId,
    pub sub_pool_id: Option<DbId>,
    pub name: String,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub days_of_week: Vec<i16>,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<&Schedule> for PoolSchedule {
    type Error = CoreError;

    fn try_from(row: &Schedule) -> Result<Self, Self::Error> {
        Ok(PoolSchedule {
            schedule_id: row.id,
            sub_pool_id: row.sub_pool_id,
            window: ScheduleWindow::new(row.starts_at, row.ends_at, row.days_of_week.clone())?,
        })
    }
}
