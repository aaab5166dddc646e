//! Sub-pool rotation and redistribution planning (pure).
//!
//! The rotation scheduler loads a [`SubPoolView`] per sub-pool, asks
//! [`plan_rotation`] which one should be active, and persists the result
//! as a single swap. [`plan_redistribution`] decides how many eligible
//! numbers to move into exhausted sub-pools.

use serde::Serialize;

use crate::schedule::ScheduleDirective;
use crate::types::DbId;

/// The rotation-relevant state of one sub-pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPoolView {
    pub id: DbId,
    pub priority: i32,
    pub active: bool,
    /// Unblocked numbers under the pool's load ceiling.
    pub eligible_numbers: i64,
}

impl SubPoolView {
    pub fn is_eligible(&self) -> bool {
        self.eligible_numbers > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// The current sub-pool stays active.
    Unchanged,
    /// A schedule window names the target sub-pool.
    Scheduled,
    /// The previous sub-pool ran out of eligible numbers.
    Exhausted,
    /// Nothing was active and an eligible sub-pool was picked.
    Started,
    /// An operator asked to move on to the next sub-pool.
    Forced,
    /// A pool-level schedule is outside its window, or every eligible
    /// sub-pool only runs inside a window that is closed.
    OutsideSchedule,
    /// The current sub-pool's schedule window closed.
    WindowClosed,
    /// No sub-pool has an eligible number.
    NoneEligible,
}

/// The outcome of one rotation decision for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    /// The sub-pool active before the decision (first in priority order if
    /// the store somehow holds several).
    pub current: Option<DbId>,
    /// The sub-pool that must be the only active one afterwards.
    pub target: Option<DbId>,
    pub reason: RotationReason,
}

impl RotationPlan {
    /// Whether the stored activation flags must change.
    ///
    /// Several active sub-pools always need a write, even when the first of
    /// them stays active.
    pub fn requires_swap(&self, sub_pools: &[SubPoolView]) -> bool {
        let active = sub_pools.iter().filter(|s| s.active).count();
        self.current != self.target || active > 1
    }

    /// No eligible sub-pool exists; an alert must be surfaced.
    pub fn is_exhausted(&self) -> bool {
        self.reason == RotationReason::NoneEligible
    }
}

fn ordered(sub_pools: &[SubPoolView]) -> Vec<&SubPoolView> {
    let mut ordered: Vec<&SubPoolView> = sub_pools.iter().collect();
    ordered.sort_by_key(|s| (s.priority, s.id));
    ordered
}

/// The first eligible sub-pool after `after` in priority order, wrapping
/// around and skipping `closed` ones. `after` itself is only returned when
/// it is the sole candidate.
fn next_eligible(ordered: &[&SubPoolView], after: Option<DbId>, closed: &[DbId]) -> Option<DbId> {
    let start = after
        .and_then(|id| ordered.iter().position(|s| s.id == id))
        .map_or(0, |pos| pos + 1);
    (0..ordered.len())
        .map(|offset| ordered[(start + offset) % ordered.len()])
        .find(|s| s.is_eligible() && !closed.contains(&s.id))
        .map(|s| s.id)
}

/// Decide which sub-pool of a pool must be active.
///
/// `force_advance` moves past the current sub-pool even if it is still
/// eligible (manual rotation). Sub-pools whose schedule windows are all
/// closed are left out of rotation.
pub fn plan_rotation(
    sub_pools: &[SubPoolView],
    directive: &ScheduleDirective,
    force_advance: bool,
) -> RotationPlan {
    let ordered = ordered(sub_pools);
    let current = ordered.iter().find(|s| s.active).map(|s| s.id);
    let plan = |target, reason| RotationPlan {
        current,
        target,
        reason,
    };

    if ordered.is_empty() {
        return plan(None, RotationReason::NoneEligible);
    }

    let closed: &[DbId] = match directive {
        ScheduleDirective::PoolOff => return plan(None, RotationReason::OutsideSchedule),
        ScheduleDirective::Target(id) => {
            let id = *id;
            if ordered.iter().any(|s| s.id == id && s.is_eligible()) {
                let reason = if current == Some(id) {
                    RotationReason::Unchanged
                } else {
                    RotationReason::Scheduled
                };
                return plan(Some(id), reason);
            }
            &[]
        }
        ScheduleDirective::Unconstrained => &[],
        ScheduleDirective::OutsideWindows(gated) => gated.as_slice(),
    };

    // Eligible numbers left only in closed sub-pools is not an exhaustion.
    let nothing_open = || {
        if ordered.iter().any(|s| s.is_eligible()) {
            plan(None, RotationReason::OutsideSchedule)
        } else {
            plan(None, RotationReason::NoneEligible)
        }
    };

    let current_view = current.and_then(|id| ordered.iter().find(|s| s.id == id));
    match current_view {
        Some(view) if closed.contains(&view.id) => {
            match next_eligible(&ordered, Some(view.id), closed) {
                Some(next) => plan(Some(next), RotationReason::WindowClosed),
                None => nothing_open(),
            }
        }
        Some(view) if view.is_eligible() && !force_advance => {
            plan(Some(view.id), RotationReason::Unchanged)
        }
        Some(view) => match next_eligible(&ordered, Some(view.id), closed) {
            Some(next) if force_advance && next != view.id => {
                plan(Some(next), RotationReason::Forced)
            }
            Some(next) if next == view.id => plan(Some(next), RotationReason::Unchanged),
            Some(next) => plan(Some(next), RotationReason::Exhausted),
            None => nothing_open(),
        },
        None => match next_eligible(&ordered, None, closed) {
            Some(first) => plan(Some(first), RotationReason::Started),
            None => nothing_open(),
        },
    }
}

// ---------------------------------------------------------------------------
// Redistribution
// ---------------------------------------------------------------------------

/// Move `count` eligible numbers from one sub-pool to another of the same
/// pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub from_sub_pool_id: DbId,
    pub to_sub_pool_id: DbId,
    pub count: i64,
}

/// Plan transfers that refill every exhausted sub-pool from the richest
/// ones, never taking a donor below the pool average or below one number.
pub fn plan_redistribution(sub_pools: &[SubPoolView]) -> Vec<Transfer> {
    if sub_pools.len() < 2 {
        return Vec::new();
    }
    let mut counts: Vec<(DbId, i32, i64)> = sub_pools
        .iter()
        .map(|s| (s.id, s.priority, s.eligible_numbers.max(0)))
        .collect();
    counts.sort_by_key(|&(id, priority, _)| (priority, id));

    let total: i64 = counts.iter().map(|c| c.2).sum();
    let average = total / counts.len() as i64;
    let mut transfers = Vec::new();

    for idx in 0..counts.len() {
        if counts[idx].2 > 0 {
            continue;
        }
        let Some(donor) = (0..counts.len())
            .filter(|&d| d != idx)
            .max_by_key(|&d| (counts[d].2, std::cmp::Reverse(d)))
        else {
            continue;
        };

        let available = counts[donor].2;
        let surplus = (available - average).min(available - 1);
        let count = surplus.min(average.max(1));
        if count <= 0 {
            continue;
        }

        counts[donor].2 -= count;
        counts[idx].2 += count;
        transfers.push(Transfer {
            from_sub_pool_id: counts[donor].0,
            to_sub_pool_id: counts[idx].0,
            count,
        });
    }

    transfers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
