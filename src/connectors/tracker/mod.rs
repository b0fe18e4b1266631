//! Product analytics events ("Project Deployed", "Deleted Project", ...).
//!
//! Tracking is best-effort: callers log failures and carry on.

use crate::configuration::TrackerSettings;
use crate::connectors::ConnectorError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod segment;

pub use segment::SegmentTracker;

#[async_trait]
pub trait Tracker: Send + Sync {
    async fn track(&self, user_id: i32, event: &str, properties: Value)
        -> Result<(), ConnectorError>;
}

/// Used when tracking is disabled.
pub struct NoopTracker;

#[async_trait]
impl Tracker for NoopTracker {
    async fn track(
        &self,
        user_id: i32,
        event: &str,
        _properties: Value,
    ) -> Result<(), ConnectorError> {
        tracing::debug!("Tracking disabled, dropping {:?} for user {}", event, user_id);
        Ok(())
    }
}

pub fn init(settings: &TrackerSettings) -> Arc<dyn Tracker> {
    if !settings.enabled {
        tracing::info!("Analytics tracking disabled");
        return Arc::new(NoopTracker);
    }

    tracing::info!("Analytics tracking enabled, endpoint: {}", settings.endpoint);
    Arc::new(SegmentTracker::new(
        settings.endpoint.clone(),
        settings.write_key.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn disabled_tracker_is_noop() {
        let tracker = init(&TrackerSettings::default());
        assert!(tracker.track(1, "Project Deployed", json!({})).await.is_ok());
    }
}
