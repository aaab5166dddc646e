//! Vendor-control API port and its HTTP adapter.
//!
//! The vendor owns queue/resource assignment. The engine only reads it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("Vendor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vendor API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// One resource attached to a vendor queue, as the vendor sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAssignment {
    pub queue_id: i64,
    pub resource_id: i64,
    /// Owner holding the reservation, if any.
    pub reserved_by: Option<String>,
    pub active: bool,
}

#[async_trait]
pub trait VendorControl: Send + Sync {
    async fn queue_assignments(&self, queue_id: i64) -> Result<Vec<RemoteAssignment>, VendorError>;
}

// ---------------------------------------------------------------------------
// HTTP adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResourcesResponse {
    #[serde(default)]
    items: Vec<ResourceItem>,
}

#[derive(Debug, Deserialize)]
struct ResourceItem {
    resource_id: i64,
    #[serde(default)]
    reserved_by: Option<String>,
    #[serde(default)]
    enabled: bool,
}

/// Client for `GET {base}/queues/{queue_id}/resources`.
pub struct HttpVendorClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpVendorClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, VendorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl VendorControl for HttpVendorClient {
    async fn queue_assignments(&self, queue_id: i64) -> Result<Vec<RemoteAssignment>, VendorError> {
        let mut request = self
            .client
            .get(format!("{}/queues/{queue_id}/resources", self.base_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ResourcesResponse = response.json().await?;
        Ok(into_assignments(queue_id, body))
    }
}

fn into_assignments(queue_id: i64, body: ResourcesResponse) -> Vec<RemoteAssignment> {
    body.items
        .into_iter()
        .map(|item| RemoteAssignment {
            queue_id,
            resource_id: item.resource_id,
            reserved_by: item.reserved_by.filter(|r| !r.is_empty()),
            active: item.enabled,
        })
        .collect()
}
