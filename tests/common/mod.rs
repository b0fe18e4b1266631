#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use launchpad::configuration::{get_configuration, DatabaseSettings, Settings};
use launchpad::connectors::{
    Acl, ConnectorError, Location, MemoryStore, ObjectStore, StorageError, Tracker, UploadBody,
};
use launchpad::db;
use launchpad::helpers::MessagePublisher;
use launchpad::models::{Deployment, DeploymentState, Domain, Project};
use launchpad::services::{BundlePublisher, ProjectLifecycle};
use serde_json::Value;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub async fn configure_database(config: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let mut connection = PgConnection::connect(&config.connection_string_without_db()).await?;

    connection
        .execute(format!(r#"CREATE DATABASE "{}""#, config.database_name).as_str())
        .await?;

    let connection_pool = PgPool::connect(&config.connection_string()).await?;

    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await?;

    Ok(connection_pool)
}

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Value,
}

/// Broker stand-in that keeps every confirmed message.
#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn invalidations(&self) -> Vec<Vec<String>> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.exchange == "edges" && msg.routing_key == "v1.invalidation")
            .map(|msg| serde_json::from_value(msg.payload["domains"].clone()).unwrap())
            .collect()
    }

    /// Payloads enqueued directly on `queue`.
    pub fn jobs(&self, queue: &str) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.exchange.is_empty() && msg.routing_key == queue)
            .map(|msg| msg.payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), String> {
        let payload = serde_json::from_slice(&payload).map_err(|err| err.to_string())?;
        self.messages.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTracker {
    pub events: Mutex<Vec<(i32, String, Value)>>,
    pub fail: AtomicBool,
}

impl RecordingTracker {
    pub fn events_named(&self, name: &str) -> Vec<(i32, Value)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event, _)| event == name)
            .map(|(user_id, _, properties)| (*user_id, properties.clone()))
            .collect()
    }
}

#[async_trait]
impl Tracker for RecordingTracker {
    async fn track(
        &self,
        user_id: i32,
        event: &str,
        properties: Value,
    ) -> Result<(), ConnectorError> {
        self.events
            .lock()
            .unwrap()
            .push((user_id, event.to_string(), properties));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnectorError::ServiceUnavailable("tracker down".to_string()));
        }
        Ok(())
    }
}

/// Memory store whose uploads fail while `failing` is set.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::default(),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn location(&self) -> &Location {
        self.inner.location()
    }

    async fn upload(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("503 Slow Down".to_string()));
        }
        self.inner.upload(key, body, content_type, acl).await
    }

    async fn download(&self, key: &str, dest: &mut tokio::fs::File) -> Result<u64, StorageError> {
        self.inner.download(key, dest).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        self.inner.delete(keys).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.inner.copy(src, dst).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }
}

pub struct TestContext {
    pub pool: PgPool,
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub tracker: Arc<RecordingTracker>,
    pub settings: Settings,
}

impl TestContext {
    pub fn bundle_publisher(&self) -> BundlePublisher {
        BundlePublisher::new(
            self.pool.clone(),
            self.store.clone(),
            self.publisher.clone(),
            self.tracker.clone(),
            self.settings.deployer.clone(),
        )
    }

    pub fn lifecycle(&self) -> ProjectLifecycle {
        ProjectLifecycle::new(
            self.pool.clone(),
            self.store.clone(),
            self.publisher.clone(),
            self.tracker.clone(),
            self.settings.deployer.clone(),
        )
    }

    pub fn suffix(&self) -> &str {
        &self.settings.deployer.default_domain_suffix
    }

    pub async fn reload_project(&self, id: i32) -> Project {
        db::project::fetch(&self.pool, id).await.unwrap().unwrap()
    }

    pub async fn reload_deployment(&self, id: i32) -> Deployment {
        db::deployment::fetch(&self.pool, id).await.unwrap().unwrap()
    }
}

/// Fresh database per test. `None` when Postgres is not reachable.
pub async fn setup() -> Option<TestContext> {
    let mut settings = get_configuration().expect("Failed to get configuration");
    settings.database.database_name = uuid::Uuid::new_v4().to_string();

    let pool = match configure_database(&settings.database).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Skipping tests: failed to connect to postgres: {}", err);
            return None;
        }
    };

    Some(TestContext {
        pool,
        store: Arc::new(MemoryStore::default()),
        publisher: Arc::new(RecordingPublisher::default()),
        tracker: Arc::new(RecordingTracker::default()),
        settings,
    })
}

pub async fn create_project(pool: &PgPool, name: &str) -> Project {
    db::project::insert(pool, Project::new(7, name.to_string()))
        .await
        .expect("Failed to insert project")
}

pub async fn create_domain(pool: &PgPool, project: &Project, name: &str) -> Domain {
    db::domain::insert(pool, Domain::new(project.id, name.to_string()))
        .await
        .expect("Failed to insert domain")
}

pub async fn create_deployment(
    pool: &PgPool,
    project: &Project,
    state: DeploymentState,
) -> Deployment {
    let version = db::deployment::next_version(pool, project.id).await.unwrap();
    let mut deployment = Deployment::new(project.id, project.user_id, version);
    deployment.state = state;
    db::deployment::insert(pool, deployment)
        .await
        .expect("Failed to insert deployment")
}

/// Makes the next deployment id `id`.
pub async fn set_next_deployment_id(pool: &PgPool, id: i64) {
    sqlx::query("SELECT setval('deployments_id_seq', $1)")
        .bind(id - 1)
        .execute(pool)
        .await
        .unwrap();
}

pub fn bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub async fn put_bundle(store: &dyn ObjectStore, key: &str, entries: &[(&str, &[u8])]) {
    store
        .upload(key, bundle(entries).into(), "application/gzip", Acl::Private)
        .await
        .unwrap();
}
