//! Shared fixtures for engine integration tests: an in-memory store that
//! implements every port, a scripted stat source and a fake vendor API.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveTime, TimeZone, Utc};
use numguard_core::lifecycle::HealthSnapshot;
use numguard_core::rotation::SubPoolView;
use numguard_core::strategy::{CallStats, ReasonCount};
use numguard_core::types::{DbId, SipCode, Timestamp};
use numguard_db::models::number::{Number, NumberFilter};
use numguard_db::models::pool::{Pool, SubPool};
use numguard_db::models::schedule::Schedule;
use numguard_db::models::team::Team;
use numguard_db::models::vendor_reservation::VendorReservation;
use numguard_events::{EventBus, PlatformEvent};
use numguard_worker::config::EngineConfig;
use numguard_worker::stats::{StatError, StatSource};
use numguard_worker::store::{
    AuditStore, NumberStore, PoolStore, ScheduleStore, StoreError, TeamStore, VendorStore,
};
use numguard_worker::vendor::{RemoteAssignment, VendorControl, VendorError};
use tokio::sync::broadcast;

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        worker_concurrency: 4,
        sweep_batch_size: 2,
        recheck_grace: chrono::Duration::zero(),
        redistribute: false,
        ..EngineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn team(id: DbId, strategy: &str, bad_sip_codes: &[SipCode]) -> Team {
    Team {
        id,
        name: format!("team-{id}"),
        active: true,
        filtration: true,
        email: Some(format!("team-{id}@example.com")),
        stop_days: 3,
        strategy: Some(strategy.to_string()),
        min_attempts: 20,
        cause_threshold: 3,
        reblock_limit: None,
        escalate_stop_days: false,
        webitel_queue_ids: Vec::new(),
        bad_sip_codes: bad_sip_codes.to_vec(),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn number(id: DbId, team_id: DbId) -> Number {
    Number {
        id,
        number: format!("+1555000{id:04}"),
        team_id: Some(team_id),
        pool_id: None,
        sub_pool_id: None,
        queue_id: None,
        client_id: None,
        load_counter: 0,
        attempts_counter: 0,
        first_load_at: None,
        last_load_at: None,
        success: false,
        blocked: false,
        blocked_at: None,
        stop_expired: None,
        recheck_since: None,
        block_count: 0,
        total_blocks: 0,
        stat_waiting: false,
        stat_waiting_since: None,
        version: 1,
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn pool(id: DbId, team_id: DbId) -> Pool {
    Pool {
        id,
        team_id,
        name: format!("pool-{id}"),
        rotation_enabled: true,
        load_ceiling: None,
        version: 1,
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn sub_pool(id: DbId, pool_id: DbId, priority: i32, active: bool) -> SubPool {
    SubPool {
        id,
        pool_id,
        name: format!("sub-{id}"),
        priority,
        active,
        daily_loads: 0,
        activated_at: None,
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn schedule(
    id: DbId,
    pool_id: DbId,
    sub_pool_id: Option<DbId>,
    starts_at: (u32, u32),
    ends_at: (u32, u32),
) -> Schedule {
    Schedule {
        id,
        pool_id,
        sub_pool_id,
        name: format!("schedule-{id}"),
        starts_at: NaiveTime::from_hms_opt(starts_at.0, starts_at.1, 0).unwrap(),
        ends_at: NaiveTime::from_hms_opt(ends_at.0, ends_at.1, 0).unwrap(),
        days_of_week: Vec::new(),
        enabled: true,
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn stats(success: u64, failure: u64, reasons: &[(SipCode, u64)]) -> CallStats {
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

/// Everything published so far.
pub fn drain_events(rx: &mut broadcast::Receiver<PlatformEvent>) -> Vec<PlatformEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[PlatformEvent]) -> Vec<&str> {
    events.iter().map(|e| e.event_type.as_str()).collect()
}

pub fn bus() -> Arc<EventBus> {
    Arc::new(EventBus::default())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct State {
    pub teams: BTreeMap<DbId, Team>,
    pub numbers: BTreeMap<DbId, Number>,
    pub pools: BTreeMap<DbId, Pool>,
    pub sub_pools: BTreeMap<DbId, SubPool>,
    pub schedules: Vec<Schedule>,
    /// `(number_id, filtered, description)`
    pub blacklist_logs: Vec<(DbId, bool, String)>,
    pub reason_snapshots: Vec<(DbId, Vec<ReasonCount>)>,
    pub reservations: Vec<VendorReservation>,
    /// Most sub-pools ever active at once in one pool.
    pub max_active_seen: usize,
    /// Health writes fail with a database error while set.
    pub fail_health_writes: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_team(&self, team: Team) {
        self.with(|s| s.teams.insert(team.id, team));
    }

    pub fn add_number(&self, number: Number) {
        self.with(|s| s.numbers.insert(number.id, number));
    }

    pub fn add_pool(&self, pool: Pool) {
        self.with(|s| s.pools.insert(pool.id, pool));
    }

    pub fn add_sub_pool(&self, sub_pool: SubPool) {
        self.with(|s| s.sub_pools.insert(sub_pool.id, sub_pool));
    }

    pub fn add_schedule(&self, schedule: Schedule) {
        self.with(|s| s.schedules.push(schedule));
    }

    /// Add `count` numbers with ids starting at `first_id` to a sub-pool.
    pub fn fill_sub_pool(&self, sub_pool_id: DbId, first_id: DbId, count: i64, blocked: bool) {
        let (pool_id, team_id) = self.with(|s| {
            let pool_id = s.sub_pools[&sub_pool_id].pool_id;
            (pool_id, s.pools[&pool_id].team_id)
        });
        for id in first_id..first_id + count {
            let mut n = number(id, team_id);
            n.pool_id = Some(pool_id);
            n.sub_pool_id = Some(sub_pool_id);
            if blocked {
                n.blocked = true;
                n.blocked_at = Some(t0());
                n.stop_expired = Some(t0() + chrono::Duration::days(3));
                n.block_count = 1;
                n.total_blocks = 1;
            }
            self.add_number(n);
        }
    }

    pub fn number(&self, id: DbId) -> Number {
        self.with(|s| s.numbers[&id].clone())
    }

    pub fn active_sub_pools(&self, pool_id: DbId) -> Vec<DbId> {
        self.with(|s| {
            s.sub_pools
                .values()
                .filter(|sp| sp.pool_id == pool_id && sp.active)
                .map(|sp| sp.id)
                .collect()
        })
    }

    fn eligible(state: &State, number: &Number) -> bool {
        let ceiling = number
            .pool_id
            .and_then(|p| state.pools.get(&p))
            .and_then(|p| p.load_ceiling);
        !number.blocked && ceiling.map_or(true, |c| number.load_counter < i64::from(c))
    }
}

#[async_trait]
impl NumberStore for MemoryStore {
    async fn find_number(&self, id: DbId) -> Result<Option<Number>, StoreError> {
        Ok(self.with(|s| s.numbers.get(&id).cloned()))
    }

    async fn list_numbers(&self, filter: &NumberFilter) -> Result<Vec<Number>, StoreError> {
        Ok(self.with(|s| {
            s.numbers
                .values()
                .filter(|n| filter.team_id.map_or(true, |v| n.team_id == Some(v)))
                .filter(|n| filter.pool_id.map_or(true, |v| n.pool_id == Some(v)))
                .filter(|n| filter.sub_pool_id.map_or(true, |v| n.sub_pool_id == Some(v)))
                .filter(|n| filter.blocked.map_or(true, |v| n.blocked == v))
                .filter(|n| filter.stat_waiting.map_or(true, |v| n.stat_waiting == v))
                .filter(|n| filter.in_recheck.map_or(true, |v| n.recheck_since.is_some() == v))
                .filter(|n| filter.after_id.map_or(true, |v| n.id > v))
                .take(filter.limit.map_or(usize::MAX, |l| l as usize))
                .cloned()
                .collect()
        }))
    }

    async fn list_cooldown_expired(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Number>, StoreError> {
        Ok(self.with(|s| {
            s.numbers
                .values()
                .filter(|n| n.blocked && n.recheck_since.is_none())
                .filter(|n| n.stop_expired.is_some_and(|until| until <= now))
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn acquire_lease(
        &self,
        id: DbId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<Option<Number>, StoreError> {
        Ok(self.with(|s| {
            let n = s.numbers.get_mut(&id)?;
            let free = !n.stat_waiting || n.stat_waiting_since.is_some_and(|t| t < stale_before);
            if !free {
                return None;
            }
            n.stat_waiting = true;
            n.stat_waiting_since = Some(now);
            Some(n.clone())
        }))
    }

    async fn release_lease(&self, id: DbId, leased_at: Timestamp) -> Result<bool, StoreError> {
        Ok(self.with(|s| match s.numbers.get_mut(&id) {
            Some(n) if n.stat_waiting_since == Some(leased_at) => {
                n.stat_waiting = false;
                n.stat_waiting_since = None;
                true
            }
            _ => false,
        }))
    }

    async fn clear_stale_leases(&self, stale_before: Timestamp) -> Result<u64, StoreError> {
        Ok(self.with(|s| {
            let mut cleared = 0;
            for n in s.numbers.values_mut() {
                if n.stat_waiting && n.stat_waiting_since.is_some_and(|t| t < stale_before) {
                    n.stat_waiting = false;
                    n.stat_waiting_since = None;
                    cleared += 1;
                }
            }
            cleared
        }))
    }

    async fn apply_health(
        &self,
        id: DbId,
        expected_version: i64,
        health: &HealthSnapshot,
        success: Option<bool>,
        leased_at: Option<Timestamp>,
    ) -> Result<bool, StoreError> {
        if self.with(|s| s.fail_health_writes) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        health
            .check_invariants()
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;
        Ok(self.with(|s| match s.numbers.get_mut(&id) {
            Some(n) if n.version == expected_version => {
                n.blocked = health.blocked;
                n.blocked_at = health.blocked_at;
                n.stop_expired = health.stop_expired;
                n.recheck_since = health.recheck_since;
                n.block_count = health.block_count;
                n.total_blocks = health.total_blocks;
                if let Some(success) = success {
                    n.success = success;
                }
                if leased_at.is_some() && n.stat_waiting_since == leased_at {
                    n.stat_waiting = false;
                    n.stat_waiting_since = None;
                }
                n.version += 1;
                true
            }
            _ => false,
        }))
    }

    async fn move_eligible(
        &self,
        from_sub_pool_id: DbId,
        to_sub_pool_id: DbId,
        count: i64,
    ) -> Result<u64, StoreError> {
        Ok(self.with(|s| {
            let view: &State = s;
            let same_pool = matches!(
                (view.sub_pools.get(&from_sub_pool_id), view.sub_pools.get(&to_sub_pool_id)),
                (Some(a), Some(b)) if a.pool_id == b.pool_id
            );
            if !same_pool {
                return 0;
            }
            let mut candidates: Vec<(i64, DbId)> = view
                .numbers
                .values()
                .filter(|n| n.sub_pool_id == Some(from_sub_pool_id))
                .filter(|n| MemoryStore::eligible(view, n))
                .map(|n| (n.load_counter, n.id))
                .collect();
            candidates.sort();
            let mut moved = 0;
            for (_, id) in candidates.into_iter().take(count.max(0) as usize) {
                if let Some(n) = s.numbers.get_mut(&id) {
                    n.sub_pool_id = Some(to_sub_pool_id);
                    moved += 1;
                }
            }
            moved
        }))
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn find_team(&self, id: DbId) -> Result<Option<Team>, StoreError> {
        Ok(self.with(|s| s.teams.get(&id).cloned()))
    }

    async fn list_filtering_teams(&self) -> Result<Vec<Team>, StoreError> {
        Ok(self.with(|s| {
            s.teams
                .values()
                .filter(|t| t.active && t.filtration)
                .cloned()
                .collect()
        }))
    }

    async fn list_active_teams(&self) -> Result<Vec<Team>, StoreError> {
        Ok(self.with(|s| s.teams.values().filter(|t| t.active).cloned().collect()))
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn find_pool(&self, id: DbId) -> Result<Option<Pool>, StoreError> {
        Ok(self.with(|s| s.pools.get(&id).cloned()))
    }

    async fn find_sub_pool(&self, id: DbId) -> Result<Option<SubPool>, StoreError> {
        Ok(self.with(|s| s.sub_pools.get(&id).cloned()))
    }

    async fn list_rotating_pools(&self) -> Result<Vec<Pool>, StoreError> {
        Ok(self.with(|s| {
            s.pools
                .values()
                .filter(|p| p.rotation_enabled)
                .filter(|p| s.teams.get(&p.team_id).is_some_and(|t| t.active))
                .cloned()
                .collect()
        }))
    }

    async fn sub_pool_eligibility(&self, pool_id: DbId) -> Result<Vec<SubPoolView>, StoreError> {
        Ok(self.with(|s| {
            let s: &State = s;
            let mut views: Vec<SubPoolView> = s
                .sub_pools
                .values()
                .filter(|sp| sp.pool_id == pool_id)
                .map(|sp| SubPoolView {
                    id: sp.id,
                    priority: sp.priority,
                    active: sp.active,
                    eligible_numbers: s
                        .numbers
                        .values()
                        .filter(|n| n.sub_pool_id == Some(sp.id))
                        .filter(|n| MemoryStore::eligible(s, n))
                        .count() as i64,
                })
                .collect();
            views.sort_by_key(|v| (v.priority, v.id));
            views
        }))
    }

    async fn swap_active(
        &self,
        pool_id: DbId,
        expected_version: i64,
        target: Option<DbId>,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self.with(|s| {
            let pool = s.pools.get_mut(&pool_id)?;
            if pool.version != expected_version {
                return None;
            }
            pool.version += 1;
            let version = pool.version;
            for sp in s.sub_pools.values_mut().filter(|sp| sp.pool_id == pool_id) {
                let should = Some(sp.id) == target;
                if should && !sp.active {
                    sp.daily_loads += 1;
                    sp.activated_at = Some(Utc::now());
                }
                sp.active = should;
            }
            let active = s
                .sub_pools
                .values()
                .filter(|sp| sp.pool_id == pool_id && sp.active)
                .count();
            s.max_active_seen = s.max_active_seen.max(active);
            Some(version)
        }))
    }

    async fn set_rotation_enabled(&self, pool_id: DbId, enabled: bool) -> Result<bool, StoreError> {
        Ok(self.with(|s| match s.pools.get_mut(&pool_id) {
            Some(p) => {
                p.rotation_enabled = enabled;
                true
            }
            None => false,
        }))
    }

    async fn reset_daily_loads(&self) -> Result<u64, StoreError> {
        Ok(self.with(|s| {
            let rotating: Vec<DbId> = s
                .pools
                .values()
                .filter(|p| p.rotation_enabled)
                .map(|p| p.id)
                .collect();
            let mut reset = 0;
            for sp in s.sub_pools.values_mut() {
                if rotating.contains(&sp.pool_id) && sp.daily_loads != 0 {
                    sp.daily_loads = 0;
                    reset += 1;
                }
            }
            reset
        }))
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn enabled_schedules(&self, pool_id: DbId) -> Result<Vec<Schedule>, StoreError> {
        Ok(self.with(|s| {
            s.schedules
                .iter()
                .filter(|sc| sc.pool_id == pool_id && sc.enabled)
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn record_blacklist(
        &self,
        number_id: DbId,
        _team_id: DbId,
        filtered: bool,
        description: &str,
    ) -> Result<(), StoreError> {
        self.with(|s| {
            s.blacklist_logs
                .push((number_id, filtered, description.to_string()))
        });
        Ok(())
    }

    async fn record_reasons(
        &self,
        number_id: DbId,
        _window_from: Timestamp,
        _window_to: Timestamp,
        reasons: &[ReasonCount],
    ) -> Result<(), StoreError> {
        self.with(|s| s.reason_snapshots.push((number_id, reasons.to_vec())));
        Ok(())
    }
}

#[async_trait]
impl VendorStore for MemoryStore {
    async fn list_reservations(&self, team_id: DbId) -> Result<Vec<VendorReservation>, StoreError> {
        Ok(self.with(|s| {
            s.reservations
                .iter()
                .filter(|r| r.team_id == team_id)
                .cloned()
                .collect()
        }))
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
        self.with(|s| {
            let existing = s
                .reservations
                .iter_mut()
                .find(|r| r.queue_id == queue_id && r.resource_id == resource_id);
            match existing {
                Some(r) => {
                    r.team_id = team_id;
                    r.reserved_by = reserved_by.map(str::to_string);
                    r.active = active;
                    r.synced_at = synced_at;
                }
                None => {
                    let id = s.reservations.len() as DbId + 1;
                    s.reservations.push(VendorReservation {
                        id,
                        team_id,
                        queue_id,
                        resource_id,
                        reserved_by: reserved_by.map(str::to_string),
                        active,
                        synced_at,
                        created_at: synced_at,
                    });
                }
            }
        });
        Ok(())
    }

    async fn deactivate_missing_reservations(
        &self,
        team_id: DbId,
        present: &[(i64, i64)],
        synced_at: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(self.with(|s| {
            let mut count = 0;
            for r in s.reservations.iter_mut().filter(|r| r.team_id == team_id) {
                if r.active && !present.contains(&(r.queue_id, r.resource_id)) {
                    r.active = false;
                    r.synced_at = synced_at;
                    count += 1;
                }
            }
            count
        }))
    }
}

// ---------------------------------------------------------------------------
// ScriptedStats
// ---------------------------------------------------------------------------

/// Stat source answering from a per-number script. Unscripted numbers have
/// an empty window.
#[derive(Default)]
pub struct ScriptedStats {
    answers: Mutex<HashMap<String, Option<CallStats>>>,
    calls: AtomicUsize,
}

impl ScriptedStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, number: &str, stats: CallStats) {
        self.answers
            .lock()
            .unwrap()
            .insert(number.to_string(), Some(stats));
    }

    pub fn unavailable(&self, number: &str) {
        self.answers.lock().unwrap().insert(number.to_string(), None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatSource for ScriptedStats {
    async fn get_call_stats(
        &self,
        number: &str,
        _from: Timestamp,
        _to: Timestamp,
    ) -> Result<CallStats, StatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.lock().unwrap().get(number) {
            Some(Some(stats)) => Ok(stats.clone()),
            Some(None) => Err(StatError::Unavailable("HTTP 503".to_string())),
            None => Ok(CallStats::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeVendor
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeVendor {
    queues: Mutex<HashMap<i64, Option<Vec<RemoteAssignment>>>>,
}

impl FakeVendor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_queue(&self, queue_id: i64, resources: &[(i64, Option<&str>, bool)]) {
        let assignments = resources
            .iter()
            .map(|&(resource_id, reserved_by, active)| RemoteAssignment {
                queue_id,
                resource_id,
                reserved_by: reserved_by.map(str::to_string),
                active,
            })
            .collect();
        self.queues.lock().unwrap().insert(queue_id, Some(assignments));
    }

    pub fn fail_queue(&self, queue_id: i64) {
        self.queues.lock().unwrap().insert(queue_id, None);
    }
}

#[async_trait]
impl VendorControl for FakeVendor {
    async fn queue_assignments(&self, queue_id: i64) -> Result<Vec<RemoteAssignment>, VendorError> {
        match self.queues.lock().unwrap().get(&queue_id) {
            Some(Some(list)) => Ok(list.clone()),
            Some(None) => Err(VendorError::Api {
                status: 503,
                body: "unavailable".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}
