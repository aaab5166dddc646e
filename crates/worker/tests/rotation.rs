mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use common::*;
use numguard_core::event_types::{POOL_EXHAUSTED, POOL_REDISTRIBUTED, POOL_ROTATED};
use numguard_core::rotation::RotationReason;
use numguard_events::EventBus;
use numguard_worker::config::EngineConfig;
use numguard_worker::daily::{DailyActivation, DailyMarker};
use numguard_worker::error::JobError;
use numguard_worker::rotation::{PoolRotationScheduler, RotationOutcome, RotationTick};
use numguard_worker::supervisor::PeriodicJob;

struct Harness {
    store: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    scheduler: Arc<PoolRotationScheduler>,
    cfg: EngineConfig,
}

/// Team 1 with pool 10 holding sub-pools A (11, priority 1, active) and
/// B (12, priority 2).
fn harness() -> Harness {
    let store = MemoryStore::new();
    let bus = bus();
    store.add_team(team(1, "unsuccessful", &[]));
    store.add_pool(pool(10, 1));
    store.add_sub_pool(sub_pool(11, 10, 1, true));
    store.add_sub_pool(sub_pool(12, 10, 2, false));
    let scheduler = Arc::new(PoolRotationScheduler::new(store.clone(), Arc::clone(&bus)));
    Harness {
        store,
        bus,
        scheduler,
        cfg: engine_config(),
    }
}

// ---------------------------------------------------------------------------
// Periodic rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_sub_pool_rotates_to_next() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 3, true);
    h.store.fill_sub_pool(12, 200, 3, false);
    let mut rx = h.bus.subscribe();

    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_matches!(
        outcome,
        RotationOutcome::Applied { ref plan, swapped: true, .. }
            if plan.reason == RotationReason::Exhausted && plan.target == Some(12)
    );
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
    assert_eq!(h.store.with(|s| s.sub_pools[&12].daily_loads), 1);

    let events = drain_events(&mut rx);
    assert_eq!(event_types(&events), vec![POOL_ROTATED]);
    assert_eq!(events[0].payload["from"], 11);
    assert_eq!(events[0].payload["to"], 12);
}

#[tokio::test]
async fn eligible_active_sub_pool_stays() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 2, false);
    h.store.fill_sub_pool(12, 200, 2, false);
    let mut rx = h.bus.subscribe();

    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_matches!(outcome, RotationOutcome::Applied { swapped: false, .. });
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn rotation_wraps_around_priority_order() {
    let h = harness();
    h.store.with(|s| {
        s.sub_pools.get_mut(&11).unwrap().active = false;
        s.sub_pools.get_mut(&12).unwrap().active = true;
    });
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, true);

    h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
}

#[tokio::test]
async fn pool_without_eligible_numbers_alerts_once() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 2, true);
    h.store.fill_sub_pool(12, 200, 2, true);
    let mut rx = h.bus.subscribe();

    let report = h.scheduler.rotate_all(&h.cfg, t0()).await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert!(h.store.active_sub_pools(10).is_empty());
    h.scheduler.rotate_all(&h.cfg, t0()).await.unwrap();

    let events = drain_events(&mut rx);
    let exhausted = events.iter().filter(|e| e.event_type == POOL_EXHAUSTED).count();
    assert_eq!(exhausted, 1);
    assert_eq!(events[0].team_id, Some(1));

    // Recovery re-arms the alert.
    h.store.fill_sub_pool(12, 300, 1, false);
    h.scheduler.rotate_all(&h.cfg, t0()).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
    h.store.with(|s| {
        for n in s.numbers.values_mut() {
            n.blocked = true;
            n.blocked_at = Some(t0());
        }
    });
    h.scheduler.rotate_all(&h.cfg, t0()).await.unwrap();
    let events = drain_events(&mut rx);
    assert_eq!(events.iter().filter(|e| e.event_type == POOL_EXHAUSTED).count(), 1);
}

#[tokio::test]
async fn at_most_one_sub_pool_is_ever_active() {
    let h = harness();
    h.store.add_sub_pool(sub_pool(13, 10, 3, false));
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, false);
    h.store.fill_sub_pool(13, 300, 1, false);

    let rounds: Vec<_> = (0..12)
        .map(|_| {
            let scheduler = Arc::clone(&h.scheduler);
            let cfg = h.cfg.clone();
            tokio::spawn(async move { scheduler.rotate_pool(&cfg, 10, true, t0()).await })
        })
        .collect();
    for round in rounds {
        round.await.unwrap().unwrap();
    }

    assert_eq!(h.store.active_sub_pools(10).len(), 1);
    assert_eq!(h.store.with(|s| s.max_active_seen), 1);
}

#[tokio::test]
async fn several_active_sub_pools_are_repaired() {
    let h = harness();
    h.store.with(|s| s.sub_pools.get_mut(&12).unwrap().active = true);
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, false);

    h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_window_selects_sub_pool() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 2, false);
    h.store.fill_sub_pool(12, 200, 2, false);
    h.store.add_schedule(schedule(1, 10, Some(12), (9, 0), (17, 0)));

    let noon = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, noon).await.unwrap();
    assert_matches!(
        outcome,
        RotationOutcome::Applied { ref plan, .. } if plan.reason == RotationReason::Scheduled
    );
    assert_eq!(h.store.active_sub_pools(10), vec![12]);

    // Once the window closes the scheduled sub-pool hands over.
    let mut rx = h.bus.subscribe();
    let closing = Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap();
    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, closing).await.unwrap();
    assert_matches!(
        outcome,
        RotationOutcome::Applied { ref plan, swapped: true, .. }
            if plan.reason == RotationReason::WindowClosed
    );
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
    assert_eq!(event_types(&drain_events(&mut rx)), vec![POOL_ROTATED]);

    // It stays out of rotation until the window opens again.
    let night = Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, night).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);

    let next_morning = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, next_morning).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
}

#[tokio::test]
async fn closed_window_with_nothing_else_eligible_is_not_exhaustion() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 2, true);
    h.store.fill_sub_pool(12, 200, 2, false);
    h.store.add_schedule(schedule(1, 10, Some(12), (9, 0), (17, 0)));

    let noon = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, noon).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![12]);

    let mut rx = h.bus.subscribe();
    let evening = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, evening).await.unwrap();
    assert_matches!(
        outcome,
        RotationOutcome::Applied { ref plan, .. } if plan.reason == RotationReason::OutsideSchedule
    );
    assert!(h.store.active_sub_pools(10).is_empty());
    assert_eq!(event_types(&drain_events(&mut rx)), vec![POOL_ROTATED]);
}

#[tokio::test]
async fn pool_schedule_outside_window_deactivates_pool() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 2, false);
    h.store.add_schedule(schedule(1, 10, None, (9, 0), (17, 0)));

    let night = Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, night).await.unwrap();
    assert!(h.store.active_sub_pools(10).is_empty());

    let morning = Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, morning).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
}

#[tokio::test]
async fn schedules_use_local_offset() {
    let mut h = harness();
    h.cfg.utc_offset = chrono::FixedOffset::east_opt(3 * 3600).unwrap();
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, false);
    h.store.add_schedule(schedule(1, 10, Some(12), (9, 0), (10, 0)));

    // 06:30 UTC is 09:30 local.
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 6, 30, 0).unwrap();
    h.scheduler.rotate_pool(&h.cfg, 10, false, at).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
}

#[tokio::test]
async fn invalid_schedule_is_ignored() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 1, false);
    let mut broken = schedule(1, 10, Some(12), (9, 0), (17, 0));
    broken.days_of_week = vec![9];
    h.store.add_schedule(broken);

    h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);
}

// ---------------------------------------------------------------------------
// Redistribution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_sub_pool_is_refilled_from_richest() {
    let mut h = harness();
    h.cfg.redistribute = true;
    h.store.add_sub_pool(sub_pool(13, 10, 3, false));
    h.store.fill_sub_pool(11, 100, 6, false);
    h.store.fill_sub_pool(12, 200, 2, true);
    h.store.fill_sub_pool(13, 300, 3, false);
    let mut rx = h.bus.subscribe();

    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_matches!(outcome, RotationOutcome::Applied { moved: 3, .. });

    let in_b = h.store.with(|s| {
        s.numbers
            .values()
            .filter(|n| n.sub_pool_id == Some(12) && !n.blocked)
            .count()
    });
    assert_eq!(in_b, 3);
    assert!(h.store.with(|s| s.numbers.values().all(|n| n.pool_id == Some(10))));
    assert_eq!(event_types(&drain_events(&mut rx)), vec![POOL_REDISTRIBUTED]);
}

#[tokio::test]
async fn redistribution_is_off_when_disabled() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 6, false);
    h.store.fill_sub_pool(12, 200, 2, true);

    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap();
    assert_matches!(outcome, RotationOutcome::Applied { moved: 0, .. });
}

// ---------------------------------------------------------------------------
// Manual actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_activation_swaps_atomically() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, false);

    assert!(h.scheduler.activate_sub_pool(12, t0()).await.unwrap());
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
    assert_matches!(
        h.scheduler.activate_sub_pool(99, t0()).await,
        Err(JobError::NotFound { entity: "sub_pool", .. })
    );
}

#[tokio::test]
async fn manual_deactivation_stops_rotation() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 1, false);

    assert!(h.scheduler.deactivate_pool(10, t0()).await.unwrap());
    assert!(h.store.active_sub_pools(10).is_empty());
    assert!(!h.store.with(|s| s.pools[&10].rotation_enabled));

    let report = h.scheduler.rotate_all(&h.cfg, t0()).await.unwrap();
    assert_eq!(report.pools, 0);
    assert_eq!(
        h.scheduler.rotate_pool(&h.cfg, 10, false, t0()).await.unwrap(),
        RotationOutcome::Disabled
    );
    assert!(h.store.active_sub_pools(10).is_empty());
}

#[tokio::test]
async fn forced_rotation_advances_eligible_pool() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.fill_sub_pool(12, 200, 1, false);

    let outcome = h.scheduler.rotate_pool(&h.cfg, 10, true, t0()).await.unwrap();
    assert_matches!(
        outcome,
        RotationOutcome::Applied { ref plan, .. } if plan.reason == RotationReason::Forced
    );
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
}

// ---------------------------------------------------------------------------
// Daily activation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn daily_activation_resets_counters_once_per_day() {
    let mut h = harness();
    h.cfg.daily_activation_at = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
    h.store.fill_sub_pool(11, 100, 1, false);
    h.store.with(|s| s.sub_pools.get_mut(&11).unwrap().daily_loads = 7);
    let marker = Arc::new(DailyMarker::new());
    let daily = DailyActivation::new(Arc::clone(&h.scheduler), Arc::clone(&marker));

    let early = Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap();
    assert_eq!(daily.run_if_due(&h.cfg, early).await.unwrap(), None);

    let after = Utc.with_ymd_and_hms(2026, 3, 2, 6, 1, 0).unwrap();
    let ran = daily.run_if_due(&h.cfg, after).await.unwrap();
    assert_eq!(ran, Some(after.date_naive()));
    assert_eq!(h.store.with(|s| s.sub_pools[&11].daily_loads), 0);

    h.store.with(|s| s.sub_pools.get_mut(&11).unwrap().daily_loads = 2);
    let later = after + Duration::hours(3);
    assert_eq!(daily.run_if_due(&h.cfg, later).await.unwrap(), None);
    assert_eq!(h.store.with(|s| s.sub_pools[&11].daily_loads), 2);

    let tomorrow = after + Duration::days(1);
    assert!(daily.run_if_due(&h.cfg, tomorrow).await.unwrap().is_some());
}

#[tokio::test]
async fn rotation_tick_defers_to_pending_daily_run() {
    let h = harness();
    h.store.fill_sub_pool(11, 100, 1, true);
    h.store.fill_sub_pool(12, 200, 1, false);
    let marker = Arc::new(DailyMarker::new());
    let tick = RotationTick::new(Arc::clone(&h.scheduler), Arc::clone(&marker));
    let cfg = Arc::new(h.cfg.clone());

    let after = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
    tick.tick(Arc::clone(&cfg), after).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![11]);

    marker.mark(after.date_naive());
    tick.tick(cfg, after).await.unwrap();
    assert_eq!(h.store.active_sub_pools(10), vec![12]);
}
