//! Routes engine events to teams and operators.
//!
//! Team-facing events (see `numguard_core::event_types::TEAM_NOTIFIED`)
//! are emailed to the owning team's address when SMTP is configured.
//! Operator alerts go to `ALERT_WEBHOOK_URL` when set.

use numguard_core::event_types::{POOL_EXHAUSTED, TEAM_NOTIFIED, VENDOR_CONFLICT};
use numguard_core::types::DbId;
use numguard_db::repositories::TeamRepo;
use numguard_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PlatformEvent;
use crate::delivery::email::EmailDelivery;
use crate::delivery::webhook::WebhookDelivery;

/// Event types posted to the alert webhook.
const ALERTED: &[&str] = &[POOL_EXHAUSTED, VENDOR_CONFLICT];

#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub alert_webhook_url: Option<String>,
}

impl NotifierConfig {
    /// | Variable            | Required | Default          |
    /// |---------------------|----------|------------------|
    /// | `ALERT_WEBHOOK_URL` | no       | (alerts disabled) |
    pub fn from_env() -> Self {
        Self {
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
        }
    }
}

/// Where one event has to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub email_team: Option<DbId>,
    pub alert: bool,
}

impl Route {
    pub fn for_event(event: &PlatformEvent) -> Self {
        let team_facing = TEAM_NOTIFIED.contains(&event.event_type.as_str());
        Self {
            email_team: event.team_id.filter(|_| team_facing),
            alert: ALERTED.contains(&event.event_type.as_str()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email_team.is_none() && !self.alert
    }
}

pub struct TeamNotifier {
    pool: DbPool,
    email: Option<EmailDelivery>,
    webhook: Option<(WebhookDelivery, String)>,
}

impl TeamNotifier {
    pub fn new(
        pool: DbPool,
        email: Option<EmailDelivery>,
        webhook: Option<(WebhookDelivery, String)>,
    ) -> Self {
        Self {
            pool,
            email,
            webhook,
        }
    }

    /// Deliver until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.handle(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Team notifier lagged, notifications lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, team notifier shutting down");
                    break;
                }
            }
        }
    }

    async fn handle(&self, event: &PlatformEvent) {
        let route = Route::for_event(event);
        if route.is_empty() {
            return;
        }

        if let (Some(team_id), Some(email)) = (route.email_team, &self.email) {
            match TeamRepo::find_by_id(&self.pool, team_id).await {
                Ok(Some(team)) => match team.email.as_deref() {
                    Some(to) => {
                        if let Err(e) = email.deliver(to, event).await {
                            tracing::error!(
                                team_id,
                                event_type = %event.event_type,
                                error = %e,
                                "Failed to email team"
                            );
                        }
                    }
                    None => tracing::debug!(team_id, "Team has no email, notification skipped"),
                },
                Ok(None) => tracing::warn!(team_id, "Notification for unknown team"),
                Err(e) => tracing::error!(team_id, error = %e, "Failed to load team"),
            }
        }

        if let (true, Some((webhook, url))) = (route.alert, &self.webhook) {
            // Delivery errors are logged inside the retry loop.
            let _ = webhook.deliver(url, event).await;
        }
    }
}
