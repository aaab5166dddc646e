//! Durable event persistence.
//!
//! [`EventPersistence`] drains a bus subscription into the `events` table
//! until the bus is dropped.

use numguard_core::types::DbId;
use numguard_db::repositories::EventRepo;
use numguard_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

pub struct EventPersistence;

impl EventPersistence {
    /// Persist every received event. Exits when the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event persistence lagged, events lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &PlatformEvent) -> Result<DbId, sqlx::Error> {
        let mut payload = event.payload.clone();
        if let (Some(team_id), Some(map)) = (event.team_id, payload.as_object_mut()) {
            map.entry("team_id").or_insert(team_id.into());
        }
        EventRepo::insert(
            pool,
            &event.event_type,
            event.source_entity_type.as_deref(),
            event.source_entity_id,
            &payload,
        )
        .await
    }
}
