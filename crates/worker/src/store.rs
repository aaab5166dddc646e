//! Store ports used by the engine.
//!
//! The relational store is the single source of truth. Jobs hold an
//! `Arc<dyn EngineStore>` and every mutation goes through a conditional
//! write; no job keeps authoritative state in memory.

use async_trait::async_trait;
use numguard_core::lifecycle::HealthSnapshot;
use numguard_core::rotation::SubPoolView;
use numguard_core::strategy::ReasonCount;
use numguard_core::types::{DbId, Timestamp};
use numguard_db::models::number::{Number, NumberFilter};
use numguard_db::models::pool::{Pool, SubPool};
use numguard_db::models::schedule::Schedule;
use numguard_db::models::team::Team;
use numguard_db::models::vendor_reservation::VendorReservation;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store answered with data that breaks its own invariants.
    #[error("Store returned inconsistent data: {0}")]
    Inconsistent(String),
}

/// Numbers: scans, the evaluation lease and conditional health writes.
#[async_trait]
pub trait NumberStore: Send + Sync {
    async fn find_number(&self, id: DbId) -> Result<Option<Number>, StoreError>;

    async fn list_numbers(&self, filter: &NumberFilter) -> Result<Vec<Number>, StoreError>;

    /// Cooldown numbers with `stop_expired <= now`.
    async fn list_cooldown_expired(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Number>, StoreError>;

    /// Set `stat_waiting` unless a lease newer than `stale_before` is held.
    /// Returns the leased row.
    async fn acquire_lease(
        &self,
        id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<Option<Number>, StoreError>;

    /// Clear the lease taken at `leased_at`; `false` if it is not ours.
    async fn release_lease(&self, id: DbId, leased_at: Timestamp) -> Result<bool, StoreError>;

    async fn clear_stale_leases(&self, stale_before: Timestamp) -> Result<u64, StoreError>;

    /// Write health columns if the row is still at `expected_version`,
    /// releasing the lease taken at `leased_at` in the same write.
    async fn apply_health(
        &self,
        id: DbId,
        expected_version: i64,
        health: &HealthSnapshot,
        success: Option<bool>,
        leased_at: Option<Timestamp>,
    ) -> Result<bool, StoreError>;

    /// Move up to `count` eligible numbers between sub-pools of one pool.
    async fn move_eligible(
        &self,
        from_sub_pool_id: DbId,
        to_sub_pool_id: DbId,
        count: i64,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn find_team(&self, id: DbId) -> Result<Option<Team>, StoreError>;

    /// Active teams with filtration on.
    async fn list_filtering_teams(&self) -> Result<Vec<Team>, StoreError>;

    async fn list_active_teams(&self) -> Result<Vec<Team>, StoreError>;
}

/// Pools and sub-pool activation.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn find_pool(&self, id: DbId) -> Result<Option<Pool>, StoreError>;

    async fn find_sub_pool(&self, id: DbId) -> Result<Option<SubPool>, StoreError>;

    /// Rotation-enabled pools of active teams.
    async fn list_rotating_pools(&self) -> Result<Vec<Pool>, StoreError>;

    async fn sub_pool_eligibility(&self, pool_id: DbId) -> Result<Vec<SubPoolView>, StoreError>;

    /// Make `target` the only active sub-pool, guarded by the pool version.
    /// Returns the new version, or `None` on a version conflict.
    async fn swap_active(
        &self,
        pool_id: DbId,
        expected_version: i64,
        target: Option<DbId>,
    ) -> Result<Option<i64>, StoreError>;

    async fn set_rotation_enabled(&self, pool_id: DbId, enabled: bool) -> Result<bool, StoreError>;

    async fn reset_daily_loads(&self) -> Result<u64, StoreError>;
}

/// Read-only schedule access.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Enabled schedules of a pool. Whether one is in its window at a given
    /// instant is decided by `numguard_core::schedule`.
    async fn enabled_schedules(&self, pool_id: DbId) -> Result<Vec<Schedule>, StoreError>;
}

/// Append-only audit trail of blocking decisions.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_blacklist(
        &self,
        number_id: DbId,
        team_id: DbId,
        filtered: bool,
        description: &str,
    ) -> Result<(), StoreError>;

    async fn record_reasons(
        &self,
        number_id: DbId,
        window_from: Timestamp,
        window_to: Timestamp,
        reasons: &[ReasonCount],
    ) -> Result<(), StoreError>;
}

/// Local mirror of vendor queue reservations.
#[async_trait]
pub trait VendorStore: Send + Sync {
    async fn list_reservations(&self, team_id: DbId) -> Result<Vec<VendorReservation>, StoreError>;

    async fn upsert_reservation(
        &self,
        team_id: DbId,
        queue_id: i64,
        resource_id: i64,
        reserved_by: Option<&str>,
        active: bool,
        synced_at: Timestamp,
    ) -> Result<(), StoreError>;

    async fn deactivate_missing_reservations(
        &self,
        team_id: DbId,
        present: &[(i64, i64)],
        synced_at: Timestamp,
    ) -> Result<u64, StoreError>;
}

/// Everything the engine needs from its store.
pub trait EngineStore:
    NumberStore + TeamStore + PoolStore + ScheduleStore + AuditStore + VendorStore
{
}

impl<T> EngineStore for T where
    T: NumberStore + TeamStore + PoolStore + ScheduleStore + AuditStore + VendorStore
{
}
