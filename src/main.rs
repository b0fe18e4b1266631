use launchpad::configuration::get_configuration;
use launchpad::connectors;
use launchpad::helpers::{MessagePublisher, MqManager};
use launchpad::services::BundlePublisher;
use launchpad::telemetry::{get_subscriber, init_subscriber};
use launchpad::worker::DeployWorker;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = get_subscriber("deployer".into(), "info".into());
    init_subscriber(subscriber);

    let settings = get_configuration().expect("Failed to read configuration.");

    tracing::info!(
        db_host = %settings.database.host,
        db_port = settings.database.port,
        db_name = %settings.database.database_name,
        "Connecting to PostgreSQL"
    );

    let connect_options = PgConnectOptions::new()
        .host(&settings.database.host)
        .port(settings.database.port)
        .username(&settings.database.username)
        .password(&settings.database.password)
        .database(&settings.database.database_name)
        .ssl_mode(PgSslMode::Disable);

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await
        .expect("Failed to connect to database.");

    let store = connectors::init_object_store(&settings.storage).await?;
    let tracker = connectors::init_tracker(&settings.tracker);

    // separate pools for publishing and consuming
    let publisher: Arc<dyn MessagePublisher> =
        Arc::new(MqManager::try_new(settings.amqp.connection_string())?);
    let consumer_mq = MqManager::try_new(settings.amqp.connection_string())?;

    let bundle_publisher = BundlePublisher::new(
        pg_pool,
        store,
        publisher,
        tracker,
        settings.deployer.clone(),
    );

    let worker = DeployWorker::new(
        consumer_mq,
        bundle_publisher,
        settings.deployer.deploy_queue.clone(),
        settings.deployer.prefetch,
    );

    worker.run().await?;
    Ok(())
}
