use crate::configuration::get_configuration;
use crate::connectors;
use crate::console::commands::{connect_db, runtime};
use crate::db;
use crate::helpers::{MessagePublisher, MqManager};
use crate::services::ProjectLifecycle;
use anyhow::anyhow;
use std::sync::Arc;

pub struct DestroyCommand {
    name: String,
}

impl DestroyCommand {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl crate::console::commands::CallableTrait for DestroyCommand {
    fn call(&self) -> Result<(), Box<dyn std::error::Error>> {
        let result: anyhow::Result<()> = runtime()?.block_on(async {
            let settings = get_configuration()?;
            let pool = connect_db(&settings).await?;

            let project = db::project::fetch_by_name(&pool, &self.name)
                .await
                .map_err(|err| anyhow!(err))?
                .ok_or_else(|| anyhow!("project {} not found", self.name))?;

            let store = connectors::init_object_store(&settings.storage).await?;
            let tracker = connectors::init_tracker(&settings.tracker);
            let publisher: Arc<dyn MessagePublisher> =
                Arc::new(MqManager::try_new(settings.amqp.connection_string())?);

            ProjectLifecycle::new(pool, store, publisher, tracker, settings.deployer.clone())
                .destroy_project(&project)
                .await?;

            println!("Project {} destroyed", project.name);
            Ok(())
        });
        Ok(result?)
    }
}
