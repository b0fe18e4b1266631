mod callable;
pub mod deploy;
pub mod mq;
pub mod project;

pub use callable::*;

use crate::configuration::Settings;
use anyhow::Context;
use sqlx::PgPool;

pub(crate) async fn connect_db(settings: &Settings) -> anyhow::Result<PgPool> {
    PgPool::connect(&settings.database.connection_string())
        .await
        .context("Failed to connect to database")
}

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start tokio runtime")
}
