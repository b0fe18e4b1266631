use crate::configuration::DeployerSettings;
use crate::connectors::object_store::layout;
use crate::connectors::{Acl, ObjectStore, StorageError, Tracker, UploadBody};
use crate::db;
use crate::errors::DeployError;
use crate::helpers::bundle;
use crate::helpers::mq_manager::MessagePublisher;
use crate::messages::{DeployJob, DomainMeta};
use crate::models::{Deployment, Project};
use crate::services::deployment_state;
use crate::services::invalidation::Invalidator;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub prefix_id: String,
    /// Every domain whose pointer document now names `prefix_id`.
    pub domains: Vec<String>,
    pub uploaded_files: usize,
}

/// Consumes deploy jobs: uploads the webroot under the deployment's own
/// prefix, repoints every domain at it and activates the deployment.
pub struct BundlePublisher {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    invalidator: Invalidator,
    tracker: Arc<dyn Tracker>,
    settings: DeployerSettings,
}

impl BundlePublisher {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
        tracker: Arc<dyn Tracker>,
        settings: DeployerSettings,
    ) -> Self {
        let invalidator = Invalidator::from_settings(publisher, &settings);
        Self {
            pool,
            store,
            invalidator,
            tracker,
            settings,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[tracing::instrument(
        name = "Publish deployment",
        skip(self, job),
        fields(
            deployment_id = job.deployment_id,
            skip_webroot_upload = job.skip_webroot_upload,
            skip_invalidation = job.skip_invalidation,
            use_raw_bundle = job.use_raw_bundle,
        )
    )]
    pub async fn publish(&self, job: &DeployJob) -> Result<PublishOutcome, DeployError> {
        let deployment = deployment_state::load(&self.pool, job.deployment_id).await?;
        let project = self.load_project(deployment.project_id).await?;
        deployment_state::ensure_publishable(&deployment, &project, job.skip_webroot_upload)?;

        // checked at the start as well so a locked project uploads nothing
        if project.is_locked() {
            return Err(DeployError::ProjectLocked(project.id));
        }

        let prefix_id = deployment.prefix_id();
        let uploaded_files = if job.skip_webroot_upload {
            0
        } else {
            self.publish_webroot(&deployment, job.use_raw_bundle).await?
        };

        // The lock may have been taken while files were uploading. Whatever
        // already landed under the prefix stays there unreferenced.
        let project = self.load_project(deployment.project_id).await?;
        if project.is_locked() {
            tracing::warn!(
                prefix_id = %prefix_id,
                "Project locked during deploy, leaving uploaded webroot unreferenced"
            );
            return Err(DeployError::ProjectLocked(project.id));
        }

        // duplicate delivery guard before anything becomes visible to edges
        let current = deployment_state::load(&self.pool, deployment.id).await?;
        if current.state != deployment.state {
            return Err(DeployError::UnexpectedState {
                deployment_id: deployment.id,
                state: current.state,
            });
        }
        deployment_state::ensure_publishable(&current, &project, job.skip_webroot_upload)?;

        let domains = self.publish_metadata(&project, &prefix_id).await?;

        if !job.skip_invalidation {
            self.invalidator.publish(&domains).await?;
        }

        let mut tx = self.pool.begin().await?;
        let deployed = deployment_state::activate(&mut *tx, &project, &deployment).await?;
        tx.commit().await?;

        tracing::info!(
            prefix_id = %prefix_id,
            version = deployed.version,
            "Deployment is live on {} domain(s)",
            domains.len()
        );

        self.track_deployed(&project, &deployed).await;

        Ok(PublishOutcome {
            prefix_id,
            domains,
            uploaded_files,
        })
    }

    async fn load_project(&self, project_id: i32) -> Result<Project, DeployError> {
        db::project::fetch(&self.pool, project_id)
            .await
            .map_err(DeployError::Database)?
            .ok_or_else(|| DeployError::NotFound(format!("project {}", project_id)))
    }

    async fn source_bundle_key(
        &self,
        deployment: &Deployment,
        use_raw_bundle: bool,
    ) -> Result<String, DeployError> {
        let prefix_id = deployment.prefix_id();
        if !use_raw_bundle {
            return Ok(layout::optimized_bundle_key(&prefix_id));
        }

        // env-var redeploys share the raw upload of an earlier deployment
        if let Some(raw_bundle_id) = deployment.raw_bundle_id {
            if let Some(raw_bundle) = db::raw_bundle::fetch(&self.pool, raw_bundle_id)
                .await
                .map_err(DeployError::Database)?
            {
                return Ok(raw_bundle.uploaded_path);
            }
        }
        Ok(layout::raw_bundle_key(&prefix_id))
    }

    async fn publish_webroot(
        &self,
        deployment: &Deployment,
        use_raw_bundle: bool,
    ) -> Result<usize, DeployError> {
        let prefix_id = deployment.prefix_id();
        let bundle_key = self.source_bundle_key(deployment, use_raw_bundle).await?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-bundle-", prefix_id))
            .suffix(".tar.gz")
            .tempfile()?;
        let mut file = tokio::fs::File::from_std(scratch.reopen()?);

        let size = match self.store.download(&bundle_key, &mut file).await {
            Ok(size) => size,
            Err(StorageError::NotFound(key)) => {
                return Err(DeployError::NotFound(format!("bundle {}", key)));
            }
            Err(err) => return Err(err.into()),
        };
        drop(file);
        tracing::info!(key = %bundle_key, size, "Bundle downloaded");

        let extracted = bundle::extract_async(scratch.path().to_path_buf()).await?;

        for file in &extracted.files {
            let key = layout::webroot_key(&prefix_id, &file.relative_path);
            tracing::debug!(key = %key, content_type = %file.content_type, "Uploading");
            self.store
                .upload(
                    &key,
                    UploadBody::File(file.path.clone()),
                    &file.content_type,
                    Acl::PublicRead,
                )
                .await?;
        }

        tracing::info!(
            prefix_id = %prefix_id,
            "Uploaded {} webroot file(s)",
            extracted.files.len()
        );
        Ok(extracted.files.len())
    }

    /// Writes the pointer document of every domain bound to the project.
    async fn publish_metadata(
        &self,
        project: &Project,
        prefix_id: &str,
    ) -> Result<Vec<String>, DeployError> {
        let meta = DomainMeta {
            prefix: prefix_id.to_string(),
            force_https: project.force_https,
            basic_auth: project.basic_auth_digest().map(str::to_string),
        };
        let body = bytes::Bytes::from(serde_json::to_vec(&meta)?);

        let domains = db::domain::fetch_by_project(&self.pool, project.id)
            .await
            .map_err(DeployError::Database)?;
        let names = project.domain_names(&domains, &self.settings.default_domain_suffix);

        for name in &names {
            self.store
                .upload(
                    &layout::domain_meta_key(name),
                    UploadBody::Bytes(body.clone()),
                    "application/json",
                    Acl::PublicRead,
                )
                .await?;
        }
        Ok(names)
    }

    async fn track_deployed(&self, project: &Project, deployment: &Deployment) {
        let deployed_at = deployment.deployed_at.unwrap_or(deployment.updated_at);
        let time_taken = (deployed_at - deployment.created_at).num_seconds();

        let event = "Project Deployed";
        let properties = json!({
            "projectName": project.name,
            "deploymentId": deployment.id,
            "deploymentPrefix": deployment.prefix,
            "deploymentVersion": deployment.version,
            "timeTakenInSeconds": time_taken,
        });

        if let Err(err) = self
            .tracker
            .track(deployment.user_id, event, properties)
            .await
        {
            tracing::warn!(
                "Failed to track {:?} event for user {}: {}",
                event,
                deployment.user_id,
                err
            );
        }
    }
}
