//! Call statistics port and its HTTP adapter.
//!
//! [`StatSource`] reports an unreachable service as [`StatError`], never as
//! an empty window: zero calls is a valid input to the strategy engine,
//! "unknown" is not.

use std::time::Duration;

use async_trait::async_trait;
use numguard_core::phone::digits_only;
use numguard_core::strategy::{CallStats, ReasonCount};
use numguard_core::types::{SipCode, Timestamp};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    /// Connection failure or a non-2xx answer.
    #[error("Stat source unavailable: {0}")]
    Unavailable(String),

    #[error("Stat source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed stat response: {0}")]
    Malformed(String),
}

impl StatError {
    /// Whether a second attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StatError::Unavailable(_) | StatError::Timeout(_))
    }
}

#[async_trait]
pub trait StatSource: Send + Sync {
    /// Aggregates for `number` (E.164) over `[from, to]`.
    async fn get_call_stats(
        &self,
        number: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<CallStats, StatError>;
}

// ---------------------------------------------------------------------------
// HTTP adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StatsResponse {
    success_count: u64,
    failure_count: u64,
    #[serde(default)]
    causes: Vec<CauseEntry>,
}

#[derive(Debug, Deserialize)]
struct CauseEntry {
    sip_code: SipCode,
    #[serde(default)]
    sip_reason: Option<String>,
    count: u64,
}

impl From<StatsResponse> for CallStats {
    fn from(body: StatsResponse) -> Self {
        CallStats {
            success_count: body.success_count,
            failure_count: body.failure_count,
            reasons: body
                .causes
                .into_iter()
                .map(|c| ReasonCount {
                    sip_code: c.sip_code,
                    sip_reason: c.sip_reason,
                    count: c.count,
                })
                .collect(),
        }
    }
}

/// Client for the call statistics service.
///
/// Issues `GET {base}/stats?number=<digits>&from=<rfc3339>&to=<rfc3339>`
/// with a bounded timeout and retries a transient failure once.
pub struct HttpStatSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpStatSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StatError::Unavailable(e.to_string()))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Reuse an existing client (connection pooling with other adapters).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn fetch(
        &self,
        number: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<CallStats, StatError> {
        let response = self
            .client
            .get(format!("{}/stats", self.base_url))
            .query(&[
                ("number", digits_only(number).to_string()),
                ("from", from.to_rfc3339()),
                ("to", to.to_rfc3339()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: StatsResponse = response
            .json()
            .await
            .map_err(|e| StatError::Malformed(e.to_string()))?;
        Ok(body.into())
    }

    fn classify(&self, error: reqwest::Error) -> StatError {
        if error.is_timeout() {
            StatError::Timeout(self.timeout)
        } else {
            StatError::Unavailable(error.to_string())
        }
    }
}

#[async_trait]
impl StatSource for HttpStatSource {
    async fn get_call_stats(
        &self,
        number: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<CallStats, StatError> {
        match self.fetch(number, from, to).await {
            Err(e) if e.is_transient() => {
                tracing::debug!(number, error = %e, "Stat request failed, retrying once");
                self.fetch(number, from, to).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_maps_onto_call_stats() {
        let body: StatsResponse = serde_json::from_value(serde_json::json!({
            "success_count": 1,
            "failure_count": 4,
            "causes": [{ "sip_code": 603, "sip_reason": "Decline", "count": 4 }]
        }))
        .unwrap();
        let stats = CallStats::from(body);
        assert_eq!(stats.attempts(), 5);
        assert_eq!(stats.cause_count(603), 4);
        assert_eq!(stats.reasons[0].sip_reason.as_deref(), Some("Decline"));
    }

    #[test]
    fn missing_causes_means_none() {
        let body: StatsResponse =
            serde_json::from_value(serde_json::json!({ "success_count": 0, "failure_count": 0 }))
                .unwrap();
        assert_eq!(CallStats::from(body), CallStats::default());
    }

    #[test]
    fn only_transport_failures_are_retried() {
        assert!(StatError::Unavailable("HTTP 502".into()).is_transient());
        assert!(StatError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!StatError::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let source = HttpStatSource::with_client(
            reqwest::Client::new(),
            "http://stats.local/",
            Duration::from_secs(1),
        );
        assert_eq!(source.base_url, "http://stats.local");
    }
}
