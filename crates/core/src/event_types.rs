//! Well-known platform event type names.
//!
//! These must match the `events.event_type` values written by the event
//! persistence service and matched by the team notifier.

/// A number was blocked by its team's strategy.
pub const NUMBER_BLOCKED: &str = "number.blocked";

/// A number exceeded its re-block limit and is held without a timer.
pub const NUMBER_HELD: &str = "number.held";

/// A number's cooldown ran out and it awaits a recheck verdict.
pub const NUMBER_RECHECK_PENDING: &str = "number.recheck_pending";

/// A number passed its recheck and is dialable again.
pub const NUMBER_RELEASED: &str = "number.released";

/// The active sub-pool of a pool changed.
pub const POOL_ROTATED: &str = "pool.rotated";

/// No sub-pool of a pool has an eligible number. Operators must act.
pub const POOL_EXHAUSTED: &str = "pool.exhausted";

/// Eligible numbers were moved between sub-pools of one pool.
pub const POOL_REDISTRIBUTED: &str = "pool.redistributed";

/// A locally active vendor reservation is held by another owner remotely.
pub const VENDOR_CONFLICT: &str = "vendor.conflict";

/// Event types that are emailed to the owning team.
pub const TEAM_NOTIFIED: &[&str] = &[NUMBER_BLOCKED, NUMBER_HELD, POOL_EXHAUSTED];
