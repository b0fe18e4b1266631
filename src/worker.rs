use crate::errors::{DeployError, ErrorClass};
use crate::helpers::mq_manager::MqManager;
use crate::messages::{self, DeployJob};
use crate::services::deployment_state;
use crate::services::BundlePublisher;
use futures_util::stream::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use std::time::Duration;

/// Pause before handing a failed delivery back, so a broker redelivering
/// instantly does not spin against a storage outage.
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// What happens to a delivery once its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// nack with requeue
    Requeue,
    /// reject without requeue; poison payloads only
    Reject,
    /// mark the deployment failed, then ack
    FailAndAck,
}

pub fn classify(err: &DeployError) -> Disposition {
    match err.class() {
        ErrorClass::Retryable => Disposition::Requeue,
        ErrorClass::Precondition => Disposition::Ack,
        ErrorClass::Fatal => Disposition::FailAndAck,
    }
}

pub struct DeployWorker {
    mq_manager: MqManager,
    publisher: BundlePublisher,
    queue: String,
    prefetch: u16,
}

impl DeployWorker {
    pub fn new(mq_manager: MqManager, publisher: BundlePublisher, queue: String, prefetch: u16) -> Self {
        Self {
            mq_manager,
            publisher,
            queue,
            prefetch,
        }
    }

    /// Runs until the consumer stream ends.
    pub async fn run(&self) -> Result<(), String> {
        let mut consumer = self
            .mq_manager
            .consume(&self.queue, "deployer", self.prefetch)
            .await?;

        tracing::info!(queue = %self.queue, prefetch = self.prefetch, "Waiting for deploy jobs");

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    tracing::error!("Consumer error: {:?}", err);
                    return Err(format!("consumer error {:?}", err));
                }
            };

            let disposition = self.handle(&delivery.data).await;
            self.settle(&delivery, disposition).await?;
        }

        tracing::info!("Consumer stream ended");
        Ok(())
    }

    /// Processes one payload and decides its fate. Never fails.
    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let job: DeployJob = match messages::decode(payload) {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(
                    "Dropping undecodable deploy job: {} (payload: {})",
                    err,
                    String::from_utf8_lossy(payload)
                );
                return Disposition::Reject;
            }
        };

        let err = match self.publisher.publish(&job).await {
            Ok(outcome) => {
                tracing::info!(
                    deployment_id = job.deployment_id,
                    prefix_id = %outcome.prefix_id,
                    uploaded_files = outcome.uploaded_files,
                    "Deploy job done"
                );
                return Disposition::Ack;
            }
            Err(err) => err,
        };

        let disposition = classify(&err);
        match disposition {
            Disposition::Requeue => {
                tracing::error!(deployment_id = job.deployment_id, "Deploy failed, will retry: {}", err)
            }
            Disposition::Ack => {
                tracing::warn!(deployment_id = job.deployment_id, "Deploy job dropped: {}", err)
            }
            Disposition::FailAndAck => {
                tracing::error!(deployment_id = job.deployment_id, "Deploy can never succeed: {}", err);
                self.fail_deployment(job.deployment_id).await;
            }
            Disposition::Reject => {}
        }
        disposition
    }

    async fn fail_deployment(&self, deployment_id: i32) {
        let pool = self.publisher.pool();
        let result = match deployment_state::load(pool, deployment_id).await {
            Ok(mut deployment) if !deployment.state.is_terminal() => {
                deployment_state::mark_failed(pool, &mut deployment).await
            }
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::error!(deployment_id, "Could not mark deployment failed: {}", err);
        }
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), String> {
        let result = match disposition {
            Disposition::Ack | Disposition::FailAndAck => {
                delivery.ack(BasicAckOptions::default()).await
            }
            Disposition::Requeue => {
                tokio::time::sleep(REQUEUE_DELAY).await;
                delivery
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await
            }
            Disposition::Reject => {
                delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
            }
        };
        result.map_err(|err| {
            let msg = format!("settling delivery {:?}", err);
            tracing::error!(msg);
            msg
        })
    }
}
