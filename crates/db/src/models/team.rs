//! Team entity: the owner of numbers and of a blocking policy.

use numguard_core::error::CoreError;
use numguard_core::lifecycle::CooldownPolicy;
use numguard_core::strategy::StrategyPolicy;
use numguard_core::types::{DbId, SipCode, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `teams` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Team {
    pub id: DbId,
    pub name: String,
    pub active: bool,
    /// Whether automatic blocking is enabled at all.
    pub filtration: bool,
    pub email: Option<String>,
    pub stop_days: i32,
    pub strategy: Option<String>,
    pub min_attempts: i32,
    pub cause_threshold: i32,
    pub reblock_limit: Option<i32>,
    pub escalate_stop_days: bool,
    pub webitel_queue_ids: Vec<i64>,
    pub bad_sip_codes: Vec<SipCode>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Team {
    /// The blocking strategy configured for this team.
    ///
    /// Fails when filtration is on but the strategy columns do not form a
    /// valid policy.
    pub fn strategy_policy(&self) -> Result<StrategyPolicy, CoreError> {
        StrategyPolicy::from_team_fields(
            self.strategy.as_deref(),
            &self.bad_sip_codes,
            self.min_attempts,
            self.cause_threshold,
        )
    }

    pub fn cooldown_policy(&self, max_stop_days: i32) -> CooldownPolicy {
        CooldownPolicy {
            stop_days: self.stop_days,
            escalate: self.escalate_stop_days,
            max_stop_days,
            reblock_limit: self.reblock_limit,
        }
    }
}

/// Fields for inserting a team (fixtures and imports).
#[derive(Debug, Clone)]
pub struct CreateTeam {
    pub name: String,
    pub filtration: bool,
    pub email: Option<String>,
    pub stop_days: i32,
    pub strategy: Option<String>,
    pub bad_sip_codes: Vec<SipCode>,
    pub webitel_queue_ids: Vec<i64>,
}
