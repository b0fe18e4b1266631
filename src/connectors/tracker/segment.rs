use super::Tracker;
use crate::connectors::ConnectorError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Segment HTTP tracking API client. The write key is sent as the basic-auth
/// username with an empty password.
pub struct SegmentTracker {
    endpoint: String,
    write_key: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackRequest<'a> {
    user_id: String,
    event: &'a str,
    properties: Value,
    timestamp: String,
}

impl SegmentTracker {
    pub fn new(endpoint: String, write_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            write_key,
            http_client,
        }
    }
}

#[async_trait]
impl Tracker for SegmentTracker {
    #[tracing::instrument(name = "Track analytics event", skip(self, properties))]
    async fn track(
        &self,
        user_id: i32,
        event: &str,
        properties: Value,
    ) -> Result<(), ConnectorError> {
        let body = TrackRequest {
            user_id: user_id.to_string(),
            event,
            properties,
            timestamp: Utc::now().to_rfc3339(),
        };

        let response = self
            .http_client
            .post(format!("{}/v1/track", self.endpoint))
            .basic_auth(&self.write_key, Some(""))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, text));
        }

        tracing::debug!("Tracked {:?} for user {}", event, user_id);
        Ok(())
    }
}
