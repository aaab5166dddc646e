//! Operational alert webhook with exponential-backoff retry.
//!
//! Used for conditions an operator has to act on (a pool with no eligible
//! sub-pool, vendor conflicts). Attempts are retried after 1 s, 2 s and 4 s.

use std::time::Duration;

use crate::bus::PlatformEvent;

const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// POST the alert body for `event` to `url`, retrying on failure.
    pub async fn deliver(&self, url: &str, event: &PlatformEvent) -> Result<(), WebhookError> {
        let body = alert_body(event);

        let mut last_err: Option<WebhookError> = None;
        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(url, &body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Alert webhook attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        match self.try_send(url, &body).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url, error = %e, "Alert webhook failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }

    async fn try_send(&self, url: &str, body: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

fn alert_body(event: &PlatformEvent) -> serde_json::Value {
    serde_json::json!({
        "text": format!("numguard alert: {}", event.event_type),
        "event_type": event.event_type,
        "team_id": event.team_id,
        "source_entity_type": event.source_entity_type,
        "source_entity_id": event.source_entity_id,
        "payload": event.payload,
        "timestamp": event.timestamp,
    })
}
