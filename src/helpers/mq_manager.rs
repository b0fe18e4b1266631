use async_trait::async_trait;
use deadpool_lapin::{Config, CreatePoolError, Object, Pool, Runtime};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{
    options::*, publisher_confirm::Confirmation, BasicProperties, Channel, Consumer, ExchangeKind,
};
use serde::ser::Serialize;

/// AMQP delivery mode for messages that must survive a broker restart.
const PERSISTENT: u8 = 2;

/// Seam between the pipeline and the broker. Resolves only once the broker
/// has confirmed the message.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), String>;
}

/// Direct-to-queue publish through the default exchange.
pub async fn enqueue_json<T: ?Sized + Serialize>(
    publisher: &dyn MessagePublisher,
    queue: &str,
    msg: &T,
) -> Result<(), String> {
    let payload = serde_json::to_vec(msg).map_err(|err| format!("{:?}", err))?;
    publisher.publish("", queue, payload).await
}

pub async fn broadcast_json<T: ?Sized + Serialize>(
    publisher: &dyn MessagePublisher,
    exchange: &str,
    routing_key: &str,
    msg: &T,
) -> Result<(), String> {
    let payload = serde_json::to_vec(msg).map_err(|err| format!("{:?}", err))?;
    publisher.publish(exchange, routing_key, payload).await
}

#[derive(Debug)]
pub struct MqManager {
    pool: Pool,
}

impl MqManager {
    pub fn try_new(url: String) -> Result<Self, std::io::Error> {
        let mut cfg = Config::default();
        cfg.url = Some(url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|err| {
            tracing::error!("{:?}", err);

            match err {
                CreatePoolError::Config(_) => {
                    std::io::Error::new(std::io::ErrorKind::Other, "config error")
                }
                CreatePoolError::Build(_) => {
                    std::io::Error::new(std::io::ErrorKind::Other, "build error")
                }
            }
        })?;

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Object, String> {
        self.pool.get().await.map_err(|err| {
            let msg = format!("getting connection from pool {:?}", err);
            tracing::error!(msg);
            msg
        })
    }

    async fn create_channel(&self) -> Result<Channel, String> {
        self.get_connection()
            .await?
            .create_channel()
            .await
            .map_err(|err| {
                let msg = format!("creating RabbitMQ channel {:?}", err);
                tracing::error!(msg);
                msg
            })
    }

    async fn create_confirm_channel(&self) -> Result<Channel, String> {
        let channel = self.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| {
                let msg = format!("enabling publisher confirms {:?}", err);
                tracing::error!(msg);
                msg
            })?;
        Ok(channel)
    }

    /// Durable work queue shared by every worker replica.
    pub async fn declare_queue(&self, channel: &Channel, queue_name: &str) -> Result<(), String> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map(|_| ())
            .map_err(|err| {
                let msg = format!("declaring queue {} {:?}", queue_name, err);
                tracing::error!(msg);
                msg
            })
    }

    pub async fn declare_topic_exchange(
        &self,
        channel: &Channel,
        exchange_name: &str,
    ) -> Result<(), String> {
        channel
            .exchange_declare(
                exchange_name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                let msg = format!("declaring exchange {} {:?}", exchange_name, err);
                tracing::error!(msg);
                msg
            })
    }

    /// Consumer on a durable work queue with at most `prefetch` unacked deliveries.
    pub async fn consume(
        &self,
        queue_name: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<Consumer, String> {
        let channel = self.create_channel().await?;
        self.declare_queue(&channel, queue_name).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|err| format!("setting prefetch {:?}", err))?;

        channel
            .basic_consume(
                queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                let msg = format!("consuming {} {:?}", queue_name, err);
                tracing::error!(msg);
                msg
            })
    }

    /// Throwaway queue bound to a topic exchange, for observing broadcasts.
    pub async fn bind_listener(
        &self,
        exchange_name: &str,
        queue_name: &str,
        routing_key: &str,
    ) -> Result<Consumer, String> {
        let channel = self.create_channel().await?;
        self.declare_topic_exchange(&channel, exchange_name).await?;

        let mut args = FieldTable::default();
        args.insert("x-expires".into(), AMQPValue::LongUInt(3600000));

        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: false,
                    durable: false,
                    exclusive: false,
                    auto_delete: true,
                    nowait: false,
                },
                args,
            )
            .await
            .map_err(|err| format!("declaring queue {} {:?}", queue_name, err))?;

        channel
            .queue_bind(
                queue_name,
                exchange_name,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| format!("binding {} to {} {:?}", queue_name, exchange_name, err))?;

        channel
            .basic_consume(
                queue_name,
                "console_listener",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| format!("consuming {} {:?}", queue_name, err))
    }
}

#[async_trait]
impl MessagePublisher for MqManager {
    #[tracing::instrument(name = "Publish message", skip(self, payload))]
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), String> {
        let channel = self.create_confirm_channel().await?;
        if exchange.is_empty() {
            // a job enqueued before any worker started must not be dropped
            self.declare_queue(&channel, routing_key).await?;
        } else {
            self.declare_topic_exchange(&channel, exchange).await?;
        }

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|err| {
                tracing::error!("publishing message {:?}", err);
                format!("publishing message {:?}", err)
            })?;

        let confirmation = confirm.await.map_err(|err| {
            let msg = format!("confirming the publication {:?}", err);
            tracing::error!(msg);
            msg
        })?;

        let _ = channel.close(200, "published").await;

        match confirmation {
            Confirmation::Ack(_) => Ok(()),
            Confirmation::Nack(_) => {
                let msg = format!("broker rejected message to {:?}/{}", exchange, routing_key);
                tracing::error!(msg);
                Err(msg)
            }
            Confirmation::NotRequested => {
                let msg = "confirmation is NotRequested".to_string();
                tracing::error!(msg);
                Err(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl MessagePublisher for Recorder {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            payload: Vec<u8>,
        ) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((exchange.to_string(), routing_key.to_string(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueue_uses_default_exchange() {
        let recorder = Recorder::default();
        enqueue_json(&recorder, "deploy", &serde_json::json!({"deploymentId": 1}))
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, "");
        assert_eq!(sent[0].1, "deploy");
        assert_eq!(sent[0].2, br#"{"deploymentId":1}"#.to_vec());
    }

    #[tokio::test]
    async fn broadcast_targets_exchange() {
        let recorder = Recorder::default();
        broadcast_json(&recorder, "edges", "v1.invalidation", &vec!["a.com"])
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!((sent[0].0.as_str(), sent[0].1.as_str()), ("edges", "v1.invalidation"));
    }
}
