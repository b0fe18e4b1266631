use crate::configuration::get_configuration;
use crate::console::commands::{connect_db, runtime};
use crate::db;
use anyhow::anyhow;

/// Administrative hold. Running deploys stop before repointing any domain.
pub struct LockCommand {
    name: String,
    locked: bool,
}

impl LockCommand {
    pub fn new(name: String, locked: bool) -> Self {
        Self { name, locked }
    }
}

impl crate::console::commands::CallableTrait for LockCommand {
    fn call(&self) -> Result<(), Box<dyn std::error::Error>> {
        let result: anyhow::Result<()> = runtime()?.block_on(async {
            let settings = get_configuration()?;
            let pool = connect_db(&settings).await?;

            let project = db::project::fetch_by_name(&pool, &self.name)
                .await
                .map_err(|err| anyhow!(err))?
                .ok_or_else(|| anyhow!("project {} not found", self.name))?;

            let project = db::project::set_locked(&pool, project.id, self.locked)
                .await
                .map_err(|err| anyhow!(err))?
                .ok_or_else(|| anyhow!("project {} disappeared", self.name))?;

            match project.locked_at {
                Some(locked_at) => println!("Project {} locked since {}", project.name, locked_at),
                None => println!("Project {} unlocked", project.name),
            }
            Ok(())
        });
        Ok(result?)
    }
}
