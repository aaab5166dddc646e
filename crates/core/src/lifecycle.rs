//! Number health state machine.
//!
//! ```text
//!              block                     stop_expired reached
//!   Active ───────────────► Cooldown ─────────────────────────► PendingRecheck
//!     ▲                        ▲                                   │   │
//!     │          re-block      └───────────────────────────────────┘   │
//!     └────────────────────────────────── clear ───────────────────────┘
//! ```
//!
//! `Blocked` is a cooldown without a timer: a number held after exceeding
//! its team's re-block limit. It only leaves through a forced recheck.
//!
//! Everything here is pure: the worker persists the resulting
//! [`HealthSnapshot`] with a conditional update.

use chrono::Duration;
use serde::Serialize;

use crate::error::CoreError;
use crate::strategy::{Phase, Verdict};
use crate::types::Timestamp;

/// Upper bound on an escalated cooldown when none is configured.
pub const DEFAULT_MAX_STOP_DAYS: i32 = 90;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberState {
    Active,
    Blocked,
    Cooldown,
    PendingRecheck,
}

impl NumberState {
    /// Which strategy phase applies when this state is evaluated.
    ///
    /// Only forced rechecks evaluate `Blocked` and `Cooldown` numbers.
    pub fn evaluation_phase(self) -> Phase {
        match self {
            NumberState::Active => Phase::Active,
            _ => Phase::Recheck,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NumberState::Active => "active",
            NumberState::Blocked => "blocked",
            NumberState::Cooldown => "cooldown",
            NumberState::PendingRecheck => "pending_recheck",
        }
    }
}

/// The health columns of a `numbers` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub blocked: bool,
    pub blocked_at: Option<Timestamp>,
    pub stop_expired: Option<Timestamp>,
    pub recheck_since: Option<Timestamp>,
    /// Consecutive blocks since the number was last released.
    pub block_count: i32,
    /// Every block the number ever received.
    pub total_blocks: i32,
}

impl HealthSnapshot {
    pub fn active() -> Self {
        Self {
            blocked: false,
            blocked_at: None,
            stop_expired: None,
            recheck_since: None,
            block_count: 0,
            total_blocks: 0,
        }
    }

    pub fn state(&self) -> NumberState {
        match (self.blocked, self.recheck_since, self.stop_expired) {
            (false, _, _) => NumberState::Active,
            (true, Some(_), _) => NumberState::PendingRecheck,
            (true, None, Some(_)) => NumberState::Cooldown,
            (true, None, None) => NumberState::Blocked,
        }
    }

    /// `blocked ⇔ blocked_at`, and timers only exist on blocked numbers.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.blocked != self.blocked_at.is_some() {
            return Err(CoreError::Validation(format!(
                "blocked={} but blocked_at={:?}",
                self.blocked, self.blocked_at
            )));
        }
        if !self.blocked && (self.stop_expired.is_some() || self.recheck_since.is_some()) {
            return Err(CoreError::Validation(
                "Cooldown timers set on an unblocked number".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cooldown policy
// ---------------------------------------------------------------------------

/// How long a block lasts, per team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub stop_days: i32,
    /// Double the cooldown for each consecutive block.
    pub escalate: bool,
    pub max_stop_days: i32,
    /// Re-blocks tolerated before a number is held without a timer.
    /// `None` means unlimited.
    pub reblock_limit: Option<i32>,
}

impl CooldownPolicy {
    pub fn new(stop_days: i32) -> Self {
        Self {
            stop_days,
            escalate: false,
            max_stop_days: DEFAULT_MAX_STOP_DAYS,
            reblock_limit: None,
        }
    }

    /// Cooldown length for the `block_count`-th block (1-based), or `None`
    /// when the number must be held instead.
    pub fn cooldown_for(&self, block_count: i32) -> Option<Duration> {
        let reblocks = (block_count - 1).max(0);
        if let Some(limit) = self.reblock_limit {
            if reblocks > limit {
                return None;
            }
        }

        let base = self.stop_days.max(0);
        let days = if self.escalate {
            let factor = 1i32.checked_shl(reblocks.min(30) as u32).unwrap_or(i32::MAX);
            base.saturating_mul(factor).min(self.max_stop_days.max(base))
        } else {
            base
        };
        Some(Duration::days(i64::from(days)))
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to persist for the health columns.
    None,
    Block {
        blocked_at: Timestamp,
        stop_expired: Option<Timestamp>,
        block_count: i32,
        reblock: bool,
    },
    BeginRecheck { since: Timestamp },
    Release,
}

impl Transition {
    pub fn is_none(&self) -> bool {
        matches!(self, Transition::None)
    }

    /// The health columns after applying this transition to `current`.
    pub fn apply(&self, current: &HealthSnapshot) -> HealthSnapshot {
        match self {
            Transition::None => current.clone(),
            Transition::Block {
                blocked_at,
                stop_expired,
                block_count,
                ..
            } => HealthSnapshot {
                blocked: true,
                blocked_at: Some(*blocked_at),
                stop_expired: *stop_expired,
                recheck_since: None,
                block_count: *block_count,
                total_blocks: current.total_blocks.saturating_add(1),
            },
            Transition::BeginRecheck { since } => HealthSnapshot {
                recheck_since: Some(*since),
                ..current.clone()
            },
            Transition::Release => HealthSnapshot {
                total_blocks: current.total_blocks,
                ..HealthSnapshot::active()
            },
        }
    }
}

/// Map a strategy verdict onto the number's current state.
///
/// Blocking an already blocked number is a no-op so `blocked_at` and
/// `stop_expired` stay put; a block during recheck is a re-block that
/// restarts the cooldown. Only re-blocks count toward escalation and the
/// re-block limit: a fresh block after a release starts over at one.
pub fn plan_transition(
    current: &HealthSnapshot,
    verdict: &Verdict,
    policy: &CooldownPolicy,
    now: Timestamp,
) -> Transition {
    let state = current.state();
    match (state, verdict) {
        (NumberState::Active, Verdict::Block(_)) => block(current, policy, now, false),
        (NumberState::PendingRecheck, Verdict::Block(_)) => block(current, policy, now, true),
        (NumberState::Blocked | NumberState::Cooldown, Verdict::Block(_)) => Transition::None,
        (NumberState::Active, Verdict::Clear) => Transition::None,
        (_, Verdict::Clear) => Transition::Release,
        (_, Verdict::NoChange) => Transition::None,
    }
}

fn block(
    current: &HealthSnapshot,
    policy: &CooldownPolicy,
    now: Timestamp,
    reblock: bool,
) -> Transition {
    let block_count = if reblock {
        current.block_count.saturating_add(1)
    } else {
        1
    };
    Transition::Block {
        blocked_at: now,
        stop_expired: policy.cooldown_for(block_count).map(|d| now + d),
        block_count,
        reblock,
    }
}

/// Move a cooldown whose timer has run out into recheck.
pub fn plan_cooldown_expiry(current: &HealthSnapshot, now: Timestamp) -> Transition {
    match (current.state(), current.stop_expired) {
        (NumberState::Cooldown, Some(until)) if now >= until => {
            Transition::BeginRecheck { since: now }
        }
        _ => Transition::None,
    }
}

/// Whether a number has waited in recheck longer than `grace` without a
/// verdict. A zero grace never elapses.
pub fn recheck_grace_elapsed(current: &HealthSnapshot, grace: Duration, now: Timestamp) -> bool {
    if grace <= Duration::zero() {
        return false;
    }
    match (current.state(), current.recheck_since) {
        (NumberState::PendingRecheck, Some(since)) => now - since >= grace,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
