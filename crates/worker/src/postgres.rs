//! [`EngineStore`](crate::store::EngineStore) backed by PostgreSQL through
//! the `numguard-db` repositories.

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
use numguard_db::repositories::{
    BlacklistRepo, NumberRepo, PoolRepo, ReasonsStatRepo, ScheduleRepo, TeamRepo,
    VendorReservationRepo,
};
use numguard_db::DbPool;

use crate::store::{
    AuditStore, NumberStore, PoolStore, ScheduleStore, StoreError, TeamStore, VendorStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NumberStore for PgStore {
    async fn find_number(&self, id: DbId) -> Result<Option<Number>, StoreError> {
        Ok(NumberRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_numbers(&self, filter: &NumberFilter) -> Result<Vec<Number>, StoreError> {
        Ok(NumberRepo::list_by_filter(&self.pool, filter).await?)
    }

    async fn list_cooldown_expired(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Number>, StoreError> {
        Ok(NumberRepo::list_cooldown_expired(&self.pool, now, limit).await?)
    }

    async fn acquire_lease(
        &self,
        id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<Option<Number>, StoreError> {
        Ok(NumberRepo::acquire_lease(&self.pool, id, now, stale_before).await?)
    }

    async fn release_lease(&self, id: DbId, leased_at: Timestamp) -> Result<bool, StoreError> {
        Ok(NumberRepo::release_lease(&self.pool, id, leased_at).await?)
    }

    async fn clear_stale_leases(&self, stale_before: Timestamp) -> Result<u64, StoreError> {
        Ok(NumberRepo::clear_stale_leases(&self.pool, stale_before).await?)
    }

    async fn apply_health(
        &self,
        id: DbId,
        expected_version: i64,
        health: &HealthSnapshot,
        success: Option<bool>,
        leased_at: Option<Timestamp>,
    ) -> Result<bool, StoreError> {
        Ok(
            NumberRepo::apply_health(&self.pool, id, expected_version, health, success, leased_at)
                .await?,
        )
    }

    async fn move_eligible(
        &self,
        from_sub_pool_id: DbId,
        to_sub_pool_id: DbId,
        count: i64,
    ) -> Result<u64, StoreError> {
        Ok(NumberRepo::move_eligible(&self.pool, from_sub_pool_id, to_sub_pool_id, count).await?)
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn find_team(&self, id: DbId) -> Result<Option<Team>, StoreError> {
        Ok(TeamRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_filtering_teams(&self) -> Result<Vec<Team>, StoreError> {
        Ok(TeamRepo::list_filtering(&self.pool).await?)
    }

    async fn list_active_teams(&self) -> Result<Vec<Team>, StoreError> {
        Ok(TeamRepo::list_active(&self.pool).await?)
    }
}

#[async_trait]
impl PoolStore for PgStore {
    async fn find_pool(&self, id: DbId) -> Result<Option<Pool>, StoreError> {
        Ok(PoolRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_sub_pool(&self, id: DbId) -> Result<Option<SubPool>, StoreError> {
        Ok(PoolRepo::find_sub_pool(&self.pool, id).await?)
    }

    async fn list_rotating_pools(&self) -> Result<Vec<Pool>, StoreError> {
        Ok(PoolRepo::list_rotating(&self.pool).await?)
    }

    async fn sub_pool_eligibility(&self, pool_id: DbId) -> Result<Vec<SubPoolView>, StoreError> {
        let rows = PoolRepo::sub_pool_eligibility(&self.pool, pool_id).await?;
        Ok(rows.into_iter().map(SubPoolView::from).collect())
    }

    async fn swap_active(
        &self,
        pool_id: DbId,
        expected_version: i64,
        target: Option<DbId>,
    ) -> Result<Option<i64>, StoreError> {
        Ok(PoolRepo::swap_active(&self.pool, pool_id, expected_version, target).await?)
    }

    async fn set_rotation_enabled(&self, pool_id: DbId, enabled: bool) -> Result<bool, StoreError> {
        Ok(PoolRepo::set_rotation_enabled(&self.pool, pool_id, enabled).await?)
    }

    async fn reset_daily_loads(&self) -> Result<u64, StoreError> {
        Ok(PoolRepo::reset_daily_loads(&self.pool).await?)
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn enabled_schedules(&self, pool_id: DbId) -> Result<Vec<Schedule>, StoreError> {
        Ok(ScheduleRepo::list_enabled_for_pool(&self.pool, pool_id).await?)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn record_blacklist(
        &self,
        number_id: DbId,
        team_id: DbId,
        filtered: bool,
        description: &str,
    ) -> Result<(), StoreError> {
        BlacklistRepo::record(&self.pool, number_id, team_id, filtered, description).await?;
        Ok(())
    }

    async fn record_reasons(
        &self,
        number_id: DbId,
        window_from: Timestamp,
        window_to: Timestamp,
        reasons: &[ReasonCount],
    ) -> Result<(), StoreError> {
        ReasonsStatRepo::insert_snapshot(&self.pool, number_id, window_from, window_to, reasons)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VendorStore for PgStore {
    async fn list_reservations(&self, team_id: DbId) -> Result<Vec<VendorReservation>, StoreError> {
        Ok(VendorReservationRepo::list_for_team(&self.pool, team_id).await?)
    }

    async fn upsert_reservation(
        &self,
        team_id: DbId,
        queue_id: i64,
        resource_id: i64,
        reserved_by: Option<&str>,
        active: bool,
        synced_at: Timestamp,
    ) -> Result<(), StoreError> {
        VendorReservationRepo::upsert(
            &self.pool,
            team_id,
            queue_id,
            resource_id,
            reserved_by,
            active,
            synced_at,
        )
        .await?;
        Ok(())
    }

    async fn deactivate_missing_reservations(
        &self,
        team_id: DbId,
        present: &[(i64, i64)],
        synced_at: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(
            VendorReservationRepo::deactivate_missing(&self.pool, team_id, present, synced_at)
                .await?,
        )
    }
}
