//! Schedule windows and the daily activation clock.
//!
//! Schedules are stored as a local wall-clock window plus ISO weekdays.
//! All evaluation takes a UTC instant and a fixed UTC offset so the same
//! input always yields the same answer regardless of the host timezone.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A recurring local-time window. `ends_at < starts_at` wraps midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    /// ISO weekdays (1 = Monday .. 7 = Sunday) on which the window opens.
    /// Empty means every day.
    pub days_of_week: Vec<i16>,
}

impl ScheduleWindow {
    pub fn new(
        starts_at: NaiveTime,
        ends_at: NaiveTime,
        days_of_week: Vec<i16>,
    ) -> Result<Self, CoreError> {
        if starts_at == ends_at {
            return Err(CoreError::Validation(
                "Schedule window must not be empty".to_string(),
            ));
        }
        if let Some(day) = days_of_week.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(CoreError::Validation(format!(
                "Invalid ISO weekday {day}, expected 1..=7"
            )));
        }
        Ok(Self {
            starts_at,
            ends_at,
            days_of_week,
        })
    }

    fn opens_on(&self, date: NaiveDate) -> bool {
        self.days_of_week.is_empty()
            || self
                .days_of_week
                .contains(&(date.weekday().number_from_monday() as i16))
    }

    /// Whether `local` falls inside the window.
    pub fn contains(&self, local: NaiveDateTime) -> bool {
        let time = local.time();
        let date = local.date();
        if self.starts_at < self.ends_at {
            self.opens_on(date) && time >= self.starts_at && time < self.ends_at
        } else {
            let evening = time >= self.starts_at && self.opens_on(date);
            let morning = time < self.ends_at
                && date
                    .pred_opt()
                    .is_some_and(|previous| self.opens_on(previous));
            evening || morning
        }
    }
}

/// Convert a UTC instant to local wall-clock time.
pub fn local_time(now: Timestamp, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// One enabled schedule of a pool, reduced to what rotation needs.
#[derive(Debug, Clone)]
pub struct PoolSchedule {
    pub schedule_id: DbId,
    /// `None` for pool-level schedules that gate the whole pool.
    pub sub_pool_id: Option<DbId>,
    pub window: ScheduleWindow,
}

/// What the schedules of a pool demand right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDirective {
    /// No schedule constrains rotation.
    Unconstrained,
    /// A schedule in its window names the sub-pool that should be active.
    Target(DbId),
    /// The pool has pool-level schedules and none is in its window.
    PoolOff,
    /// Sub-pool schedules exist and all of them are closed. The listed
    /// sub-pools only run inside their windows, so they must not stay or
    /// become active now.
    OutsideWindows(Vec<DbId>),
}

/// Reduce a pool's schedules to a single directive.
///
/// When several sub-pool schedules are in their window the one with the
/// lowest schedule id wins, keeping the result stable across ticks.
pub fn directive_for(schedules: &[PoolSchedule], local: NaiveDateTime) -> ScheduleDirective {
    let mut in_window: Vec<&PoolSchedule> =
        schedules.iter().filter(|s| s.window.contains(local)).collect();
    in_window.sort_by_key(|s| s.schedule_id);

    if let Some(target) = in_window.iter().find_map(|s| s.sub_pool_id) {
        return ScheduleDirective::Target(target);
    }

    let has_pool_level = schedules.iter().any(|s| s.sub_pool_id.is_none());
    let pool_level_open = in_window.iter().any(|s| s.sub_pool_id.is_none());
    if has_pool_level && !pool_level_open {
        return ScheduleDirective::PoolOff;
    }

    let mut gated: Vec<DbId> = schedules.iter().filter_map(|s| s.sub_pool_id).collect();
    gated.sort_unstable();
    gated.dedup();
    if gated.is_empty() {
        ScheduleDirective::Unconstrained
    } else {
        ScheduleDirective::OutsideWindows(gated)
    }
}

// ---------------------------------------------------------------------------
// Daily activation clock
// ---------------------------------------------------------------------------

/// The next UTC instant strictly after `now` at which the local clock reads
/// `at`.
pub fn next_daily_run(now: Timestamp, at: NaiveTime, offset: FixedOffset) -> Timestamp {
    let local = local_time(now, offset);
    let today = local.date().and_time(at);
    let next_local = if today > local {
        today
    } else {
        today + Duration::days(1)
    };
    let utc_naive = next_local - Duration::seconds(i64::from(offset.local_minus_utc()));
    utc_naive.and_utc()
}

/// The local date whose daily run is due but not yet recorded, if any.
///
/// `last_run` is the local date of the last completed daily run.
pub fn daily_run_due(
    now: Timestamp,
    at: NaiveTime,
    offset: FixedOffset,
    last_run: Option<NaiveDate>,
) -> Option<NaiveDate> {
    let local = local_time(now, offset);
    if local.time() < at {
        return None;
    }
    let today = local.date();
    match last_run {
        Some(done) if done >= today => None,
        _ => Some(today),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
