use crate::configuration::get_configuration;
use crate::console::commands::runtime;
use crate::helpers::MqManager;
use crate::messages::{self, InvalidationMessage};
use futures_util::stream::StreamExt;
use lapin::options::BasicAckOptions;

/// Prints every invalidation broadcast seen on the edges exchange.
pub struct ListenCommand {}

impl ListenCommand {
    pub fn new() -> Self {
        Self {}
    }
}

impl crate::console::commands::CallableTrait for ListenCommand {
    fn call(&self) -> Result<(), Box<dyn std::error::Error>> {
        runtime()?.block_on(async {
            let settings = get_configuration()?;
            let mq_manager = MqManager::try_new(settings.amqp.connection_string())?;

            let queue_name = format!("console_listener_{}", uuid::Uuid::new_v4());
            let mut consumer = mq_manager
                .bind_listener(
                    &settings.deployer.edges_exchange,
                    &queue_name,
                    &settings.deployer.invalidation_routing_key,
                )
                .await?;

            println!(
                "Listening on {} ({})",
                settings.deployer.edges_exchange, settings.deployer.invalidation_routing_key
            );

            while let Some(delivery) = consumer.next().await {
                let delivery = delivery?;
                match messages::decode::<InvalidationMessage>(&delivery.data) {
                    Ok(msg) => println!("invalidate {}", msg.domains.join(", ")),
                    Err(err) => println!(
                        "undecodable message ({}): {}",
                        err,
                        String::from_utf8_lossy(&delivery.data)
                    ),
                }
                delivery.ack(BasicAckOptions::default()).await?;
            }

            Ok::<(), Box<dyn std::error::Error>>(())
        })
    }
}
