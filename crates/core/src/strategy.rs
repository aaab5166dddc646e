//! Blocking strategies for outbound numbers.
//!
//! A team selects exactly one [`StrategyKind`]. [`evaluate`] is a pure
//! function over the team's [`StrategyPolicy`] and one window of
//! [`CallStats`]: identical inputs always produce the same [`Verdict`].
//! Persistence and lifecycle bookkeeping live in [`crate::lifecycle`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SipCode;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Attempts without a single success before `unsuccessful` blocks a number.
pub const DEFAULT_MIN_ATTEMPTS: u32 = 20;

/// Occurrences of one bad SIP code before `cause` blocks a number.
pub const DEFAULT_CAUSE_THRESHOLD: u32 = 3;

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// The closed set of blocking strategies a team can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Block numbers that keep failing without any successful call.
    Unsuccessful,
    /// Block numbers that accumulate carrier rejection codes.
    Cause,
}

impl StrategyKind {
    /// The value stored in `teams.strategy`.
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Unsuccessful => "unsuccessful",
            StrategyKind::Cause => "cause",
        }
    }

    /// Parse the `teams.strategy` column.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim() {
            "unsuccessful" => Ok(StrategyKind::Unsuccessful),
            "cause" => Ok(StrategyKind::Cause),
            other => Err(CoreError::Validation(format!(
                "Unknown blocking strategy \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team's blocking configuration, validated once per evaluation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPolicy {
    pub kind: StrategyKind,
    /// Sorted, deduplicated. Only consulted by [`StrategyKind::Cause`].
    pub bad_sip_codes: Vec<SipCode>,
    pub min_attempts: u32,
    pub cause_threshold: u32,
}

impl StrategyPolicy {
    /// Build a policy from the raw team columns.
    ///
    /// A team with filtration enabled but no usable strategy is a
    /// configuration error: the caller must leave its numbers untouched.
    pub fn from_team_fields(
        strategy: Option<&str>,
        bad_sip_codes: &[SipCode],
        min_attempts: i32,
        cause_threshold: i32,
    ) -> Result<Self, CoreError> {
        let raw = strategy
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CoreError::Validation("Team has no blocking strategy".to_string()))?;
        let kind = StrategyKind::parse(raw)?;

        if min_attempts <= 0 {
            return Err(CoreError::Validation(format!(
                "min_attempts must be positive, got {min_attempts}"
            )));
        }
        if cause_threshold <= 0 {
            return Err(CoreError::Validation(format!(
                "cause_threshold must be positive, got {cause_threshold}"
            )));
        }

        let mut codes = bad_sip_codes.to_vec();
        codes.sort_unstable();
        codes.dedup();

        if kind == StrategyKind::Cause && codes.is_empty() {
            return Err(CoreError::Validation(
                "Strategy \"cause\" requires at least one bad SIP code".to_string(),
            ));
        }

        Ok(Self {
            kind,
            bad_sip_codes: codes,
            min_attempts: min_attempts as u32,
            cause_threshold: cause_threshold as u32,
        })
    }
}

// ---------------------------------------------------------------------------
// Statistics window
// ---------------------------------------------------------------------------

/// Occurrences of one SIP result code inside a statistics window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub sip_code: SipCode,
    pub sip_reason: Option<String>,
    pub count: u64,
}

/// Call outcome aggregates for one number over one window.
///
/// An empty window (no calls) is a legitimate input. An unreachable
/// statistics service is not represented here at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default)]
    pub reasons: Vec<ReasonCount>,
}

impl CallStats {
    /// Counts come from a remote service; sums saturate instead of
    /// overflowing.
    pub fn attempts(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    /// Total occurrences of `code`, summing duplicate entries.
    pub fn cause_count(&self, code: SipCode) -> u64 {
        self.reasons
            .iter()
            .filter(|r| r.sip_code == code)
            .fold(0u64, |total, r| total.saturating_add(r.count))
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Whether the number is being watched for blocking or rechecked after a
/// cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Recheck,
}

/// The offending metric behind a block verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    NoSuccess { attempts: u64 },
    BadCause { sip_code: SipCode, count: u64 },
}

impl BlockReason {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            BlockReason::NoSuccess { .. } => StrategyKind::Unsuccessful,
            BlockReason::BadCause { .. } => StrategyKind::Cause,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::NoSuccess { attempts } => {
                write!(f, "unsuccessful: 0 successes in {attempts} attempts")
            }
            BlockReason::BadCause { sip_code, count } => {
                write!(f, "cause: SIP {sip_code} seen {count} times")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Block(BlockReason),
    Clear,
    NoChange,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Decide whether a number must be blocked, cleared, or left alone.
pub fn evaluate(policy: &StrategyPolicy, phase: Phase, stats: &CallStats) -> Verdict {
    match policy.kind {
        StrategyKind::Unsuccessful => evaluate_unsuccessful(policy, phase, stats),
        StrategyKind::Cause => evaluate_cause(policy, phase, stats),
    }
}

fn evaluate_unsuccessful(policy: &StrategyPolicy, phase: Phase, stats: &CallStats) -> Verdict {
    let attempts = stats.attempts();
    if stats.success_count == 0 && attempts >= u64::from(policy.min_attempts) {
        return Verdict::Block(BlockReason::NoSuccess { attempts });
    }
    match phase {
        Phase::Recheck if stats.success_count > 0 => Verdict::Clear,
        _ => Verdict::NoChange,
    }
}

fn evaluate_cause(policy: &StrategyPolicy, phase: Phase, stats: &CallStats) -> Verdict {
    // Highest offending count wins; ties go to the lowest code.
    let worst = policy
        .bad_sip_codes
        .iter()
        .map(|&code| (code, stats.cause_count(code)))
        .fold(None::<(SipCode, u64)>, |best, (code, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ if count == 0 => best,
            _ => Some((code, count)),
        });

    match worst {
        Some((sip_code, count)) if count >= u64::from(policy.cause_threshold) => {
            Verdict::Block(BlockReason::BadCause { sip_code, count })
        }
        Some(_) => Verdict::NoChange,
        None if phase == Phase::Recheck => Verdict::Clear,
        None => Verdict::NoChange,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn unsuccessful(min_attempts: i32) -> StrategyPolicy {
        StrategyPolicy::from_team_fields(Some("unsuccessful"), &[], min_attempts, 3).unwrap()
    }

    fn cause(codes: &[SipCode], threshold: i32) -> StrategyPolicy {
        StrategyPolicy::from_team_fields(Some("cause"), codes, 20, threshold).unwrap()
    }

    fn stats(success: u64, failure: u64, reasons: &[(SipCode, u64)]) -> CallStats {
        CallStats {
            success_count: success,
            failure_count: failure,
            reasons: reasons
                .iter()
                .map(|&(sip_code, count)| ReasonCount {
                    sip_code,
                    sip_reason: None,
                    count,
                })
                .collect(),
        }
    }

    // -- policy construction --------------------------------------------------

    #[test]
    fn missing_strategy_is_config_error() {
        assert!(StrategyPolicy::from_team_fields(None, &[], 20, 3).is_err());
        assert!(StrategyPolicy::from_team_fields(Some("  "), &[], 20, 3).is_err());
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let err = StrategyPolicy::from_team_fields(Some("random"), &[], 20, 3).unwrap_err();
        assert!(err.to_string().contains("random"));
    }

    #[test]
    fn cause_without_codes_is_config_error() {
        assert!(StrategyPolicy::from_team_fields(Some("cause"), &[], 20, 3).is_err());
    }

    #[test]
    fn non_positive_thresholds_rejected() {
        assert!(StrategyPolicy::from_team_fields(Some("unsuccessful"), &[], 0, 3).is_err());
        assert!(StrategyPolicy::from_team_fields(Some("cause"), &[603], 20, -1).is_err());
    }

    #[test]
    fn bad_codes_are_sorted_and_deduplicated() {
        let policy = cause(&[603, 486, 603], 3);
        assert_eq!(policy.bad_sip_codes, vec![486, 603]);
    }

    #[test]
    fn strategy_round_trips_through_column_value() {
        for kind in [StrategyKind::Unsuccessful, StrategyKind::Cause] {
            assert_eq!(StrategyKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    // -- unsuccessful ---------------------------------------------------------

    #[test]
    fn zero_successes_over_threshold_blocks() {
        let verdict = evaluate(&unsuccessful(20), Phase::Active, &stats(0, 50, &[]));
        assert_eq!(
            verdict,
            Verdict::Block(BlockReason::NoSuccess { attempts: 50 })
        );
    }

    #[test]
    fn zero_successes_below_threshold_is_no_change() {
        let verdict = evaluate(&unsuccessful(20), Phase::Active, &stats(0, 19, &[]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn single_success_keeps_active_number() {
        let verdict = evaluate(&unsuccessful(20), Phase::Active, &stats(1, 80, &[]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn active_phase_never_clears() {
        let verdict = evaluate(&unsuccessful(20), Phase::Active, &stats(10, 0, &[]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn recheck_with_one_success_clears() {
        let verdict = evaluate(&unsuccessful(20), Phase::Recheck, &stats(1, 4, &[]));
        assert_eq!(verdict, Verdict::Clear);
    }

    #[test]
    fn recheck_without_success_and_few_attempts_waits() {
        let verdict = evaluate(&unsuccessful(20), Phase::Recheck, &stats(0, 5, &[]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn recheck_without_success_over_threshold_reblocks() {
        let verdict = evaluate(&unsuccessful(20), Phase::Recheck, &stats(0, 25, &[]));
        assert_matches!(verdict, Verdict::Block(BlockReason::NoSuccess { attempts: 25 }));
    }

    // -- cause ----------------------------------------------------------------

    #[test]
    fn bad_cause_over_threshold_blocks() {
        let verdict = evaluate(&cause(&[603], 3), Phase::Active, &stats(2, 5, &[(603, 5)]));
        assert_eq!(
            verdict,
            Verdict::Block(BlockReason::BadCause {
                sip_code: 603,
                count: 5
            })
        );
    }

    #[test]
    fn bad_cause_below_threshold_is_no_change() {
        let verdict = evaluate(&cause(&[603], 3), Phase::Active, &stats(2, 2, &[(603, 2)]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn codes_outside_bad_set_are_ignored() {
        let verdict = evaluate(&cause(&[603], 3), Phase::Active, &stats(0, 40, &[(486, 40)]));
        assert_eq!(verdict, Verdict::NoChange);
    }

    #[test]
    fn duplicate_reason_entries_are_summed() {
        let verdict = evaluate(
            &cause(&[603], 3),
            Phase::Active,
            &stats(0, 4, &[(603, 2), (603, 2)]),
        );
        assert_matches!(verdict, Verdict::Block(BlockReason::BadCause { count: 4, .. }));
    }

    #[test]
    fn huge_counts_saturate() {
        let s = stats(u64::MAX, 5, &[(603, u64::MAX), (603, 7)]);
        assert_eq!(s.attempts(), u64::MAX);
        assert_eq!(s.cause_count(603), u64::MAX);

        let verdict = evaluate(&cause(&[603], 3), Phase::Active, &s);
        assert_matches!(
            verdict,
            Verdict::Block(BlockReason::BadCause { sip_code: 603, count: u64::MAX })
        );
    }

    #[test]
    fn worst_offending_code_is_reported() {
        let verdict = evaluate(
            &cause(&[486, 603], 3),
            Phase::Active,
            &stats(0, 12, &[(486, 4), (603, 8)]),
        );
        assert_matches!(
            verdict,
            Verdict::Block(BlockReason::BadCause { sip_code: 603, count: 8 })
        );
    }

    #[test]
    fn recheck_requires_zero_bad_occurrences_to_clear() {
        let policy = cause(&[603], 3);
        assert_eq!(
            evaluate(&policy, Phase::Recheck, &stats(3, 1, &[(603, 1)])),
            Verdict::NoChange
        );
        assert_eq!(
            evaluate(&policy, Phase::Recheck, &stats(3, 1, &[(486, 1)])),
            Verdict::Clear
        );
    }

    #[test]
    fn recheck_with_empty_window_clears_cause() {
        let verdict = evaluate(&cause(&[603], 3), Phase::Recheck, &CallStats::default());
        assert_eq!(verdict, Verdict::Clear);
    }

    // -- determinism ----------------------------------------------------------

    #[test]
    fn identical_inputs_yield_identical_verdicts() {
        let policy = cause(&[480, 603], 3);
        let window = stats(1, 9, &[(603, 3), (480, 3)]);
        let first = evaluate(&policy, Phase::Active, &window);
        for _ in 0..100 {
            assert_eq!(evaluate(&policy, Phase::Active, &window), first);
        }
        // Tie between 480 and 603 resolves to the lower code.
        assert_matches!(first, Verdict::Block(BlockReason::BadCause { sip_code: 480, .. }));
    }

    #[test]
    fn block_reason_describes_metric() {
        let reason = BlockReason::BadCause {
            sip_code: 603,
            count: 5,
        };
        assert_eq!(reason.strategy(), StrategyKind::Cause);
        assert_eq!(reason.to_string(), "cause: SIP 603 seen 5 times");
    }
}
