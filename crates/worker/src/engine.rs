//! Wires the engine's managers and jobs under one [`TaskSupervisor`].

use std::sync::Arc;

use numguard_db::DbPool;
use numguard_events::{
    EmailConfig, EmailDelivery, EventBus, EventPersistence, NotifierConfig, TeamNotifier,
    WebhookDelivery,
};

use crate::config::{reload_on_sighup, ConfigHandle, EngineConfig};
use crate::cooldown::CooldownSweep;
use crate::daily::{DailyActivation, DailyMarker};
use crate::error::JobError;
use crate::evaluation::StrategySweep;
use crate::lifecycle::NumberLifecycleManager;
use crate::manual::{self, ManualActionConsumer, ManualActionSender};
use crate::rotation::{PoolRotationScheduler, RotationTick};
use crate::stats::{HttpStatSource, StatSource};
use crate::store::EngineStore;
use crate::supervisor::TaskSupervisor;
use crate::vendor::{HttpVendorClient, VendorControl};
use crate::vendor_sync::VendorSyncAgent;

/// The collaborators the engine runs against.
pub struct EngineParts {
    pub store: Arc<dyn EngineStore>,
    pub stats: Arc<dyn StatSource>,
    /// `None` disables `vendor_sync`.
    pub vendor: Option<Arc<dyn VendorControl>>,
    pub bus: Arc<EventBus>,
}

impl EngineParts {
    /// Build the HTTP stat and vendor clients from `cfg`.
    ///
    /// Base URLs and timeouts are read once; changing them needs a restart.
    pub fn with_http_clients(
        cfg: &EngineConfig,
        store: Arc<dyn EngineStore>,
        bus: Arc<EventBus>,
    ) -> Result<Self, JobError> {
        let stats = HttpStatSource::new(cfg.stat_base_url.clone(), cfg.stat_timeout)?;
        let vendor = match &cfg.vendor_base_url {
            Some(url) => Some(Arc::new(HttpVendorClient::new(
                url.clone(),
                cfg.vendor_token.clone(),
                cfg.stat_timeout,
            )?) as Arc<dyn VendorControl>),
            None => None,
        };
        Ok(Self {
            store,
            stats: Arc::new(stats),
            vendor,
            bus,
        })
    }
}

/// A running engine.
pub struct Engine {
    pub supervisor: TaskSupervisor,
    pub manual: ManualActionSender,
}

impl Engine {
    /// Spawn every job. Must be called inside a Tokio runtime.
    ///
    /// `daily_activation` is spawned before `rotation_tick` so that on a
    /// shared tick the daily run goes first.
    pub fn start(config: ConfigHandle, parts: EngineParts) -> Self {
        let snapshot = config.snapshot();
        let supervisor = TaskSupervisor::new(config.clone());

        let manager = Arc::new(NumberLifecycleManager::new(
            Arc::clone(&parts.store),
            parts.stats,
            Arc::clone(&parts.bus),
        ));
        let scheduler = Arc::new(PoolRotationScheduler::new(
            Arc::clone(&parts.store),
            Arc::clone(&parts.bus),
        ));
        let marker = Arc::new(DailyMarker::new());

        supervisor.spawn_periodic(Arc::new(CooldownSweep::new(Arc::clone(&manager))));
        supervisor.spawn_periodic(Arc::new(StrategySweep::new(Arc::clone(&manager))));
        supervisor.spawn_periodic(Arc::new(DailyActivation::new(
            Arc::clone(&scheduler),
            Arc::clone(&marker),
        )));
        supervisor.spawn_periodic(Arc::new(RotationTick::new(
            Arc::clone(&scheduler),
            marker,
        )));

        match parts.vendor {
            Some(vendor) => supervisor.spawn_periodic(Arc::new(VendorSyncAgent::new(
                Arc::clone(&parts.store),
                vendor,
                Arc::clone(&parts.bus),
            ))),
            None => tracing::info!("VENDOR_API_URL not set, vendor sync disabled"),
        }

        let (sender, rx) = manual::channel(snapshot.manual_queue_capacity);
        let consumer = ManualActionConsumer::new(config.clone(), manager, scheduler);
        supervisor.spawn_task("manual_actions", consumer.run(rx, supervisor.cancel_token()));
        supervisor.spawn_task("config_reload", reload_on_sighup(config, supervisor.cancel_token()));

        tracing::info!(config_version = snapshot.version, "Engine started");
        Self {
            supervisor,
            manual: sender,
        }
    }
}

// ---------------------------------------------------------------------------
// Event services
// ---------------------------------------------------------------------------

/// Event persistence and the team notifier, both fed by the bus.
pub struct EventServices {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl EventServices {
    /// Subscribe persistence and the notifier to `bus`.
    ///
    /// Email is enabled when SMTP is configured, the alert webhook when
    /// `ALERT_WEBHOOK_URL` is set.
    pub fn spawn(pool: DbPool, bus: &EventBus) -> Self {
        let persistence = tokio::spawn(EventPersistence::run(pool.clone(), bus.subscribe()));

        let email = EmailConfig::from_env().map(EmailDelivery::new);
        if email.is_none() {
            tracing::info!("SMTP not configured, team emails disabled");
        }
        let webhook = NotifierConfig::from_env()
            .alert_webhook_url
            .and_then(|url| match WebhookDelivery::new() {
                Ok(delivery) => Some((delivery, url)),
                Err(e) => {
                    tracing::error!(error = %e, "Alert webhook client unavailable");
                    None
                }
            });
        let notifier = tokio::spawn(TeamNotifier::new(pool, email, webhook).run(bus.subscribe()));

        tracing::info!("Event services started (persistence, team notifier)");
        Self {
            handles: vec![persistence, notifier],
        }
    }

    /// Wait for the services to drain after every bus handle was dropped.
    pub async fn drain(self, timeout: std::time::Duration) {
        for handle in self.handles {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("Event service did not drain in time");
            }
        }
    }
}
