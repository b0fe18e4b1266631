use crate::configuration::DeployerSettings;
use crate::errors::DeployError;
use crate::helpers::mq_manager::{broadcast_json, MessagePublisher};
use crate::messages::InvalidationMessage;
use std::sync::Arc;

/// Tells edge nodes to drop cached pointer documents. Fire-and-forget: the
/// broker confirms receipt, nobody confirms the purge.
#[derive(Clone)]
pub struct Invalidator {
    publisher: Arc<dyn MessagePublisher>,
    exchange: String,
    routing_key: String,
}

impl Invalidator {
    pub fn new(publisher: Arc<dyn MessagePublisher>, exchange: String, routing_key: String) -> Self {
        Self {
            publisher,
            exchange,
            routing_key,
        }
    }

    pub fn from_settings(publisher: Arc<dyn MessagePublisher>, settings: &DeployerSettings) -> Self {
        Self::new(
            publisher,
            settings.edges_exchange.clone(),
            settings.invalidation_routing_key.clone(),
        )
    }

    pub async fn publish(&self, domains: &[String]) -> Result<(), DeployError> {
        if domains.is_empty() {
            return Ok(());
        }

        let message = InvalidationMessage {
            domains: domains.to_vec(),
        };
        broadcast_json(
            self.publisher.as_ref(),
            &self.exchange,
            &self.routing_key,
            &message,
        )
        .await
        .map_err(DeployError::Queue)?;

        tracing::info!(domains = ?domains, "Invalidation published");
        Ok(())
    }
}
