use crate::configuration::get_configuration;
use crate::console::commands::{connect_db, runtime};
use crate::db;
use crate::helpers::MqManager;
use crate::messages::DeployJob;
use crate::services::enqueue_deploy;
use anyhow::anyhow;

pub struct EnqueueCommand {
    job: DeployJob,
}

impl EnqueueCommand {
    pub fn new(
        deployment_id: i32,
        skip_webroot_upload: bool,
        skip_invalidation: bool,
        use_raw_bundle: bool,
    ) -> Self {
        Self {
            job: DeployJob {
                deployment_id,
                skip_webroot_upload,
                skip_invalidation,
                use_raw_bundle,
            },
        }
    }
}

impl crate::console::commands::CallableTrait for EnqueueCommand {
    fn call(&self) -> Result<(), Box<dyn std::error::Error>> {
        let result: anyhow::Result<()> = runtime()?.block_on(async {
            let settings = get_configuration()?;
            let pool = connect_db(&settings).await?;

            let deployment = db::deployment::fetch(&pool, self.job.deployment_id)
                .await
                .map_err(|err| anyhow!(err))?
                .ok_or_else(|| anyhow!("deployment {} not found", self.job.deployment_id))?;

            let mq_manager = MqManager::try_new(settings.amqp.connection_string())?;
            enqueue_deploy(&mq_manager, &settings.deployer, &self.job).await?;

            println!(
                "Enqueued deploy of {} (currently {})",
                deployment.prefix_id(),
                deployment.state
            );
            Ok(())
        });
        Ok(result?)
    }
}
