//! Storage and queue side effects of project-level changes made outside the
//! deploy pipeline: deletion, settings edits and env-var redeploys.

use crate::configuration::DeployerSettings;
use crate::connectors::object_store::layout;
use crate::connectors::{ObjectStore, Tracker};
use crate::db;
use crate::errors::DeployError;
use crate::helpers::mq_manager::{enqueue_json, MessagePublisher};
use crate::messages::{BuildJob, DeployJob};
use crate::models::{Deployment, DeploymentState, Project};
use crate::services::deployment_state;
use crate::services::invalidation::Invalidator;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

/// Partial update of the user-editable project flags. `None` leaves a field alone;
/// `basic_auth: Some(None)` removes the credentials.
#[derive(Debug, Clone, Default)]
pub struct ProjectSettingsChange {
    pub force_https: Option<bool>,
    pub default_domain_enabled: Option<bool>,
    pub skip_build: Option<bool>,
    pub basic_auth: Option<Option<(String, String)>>,
}

pub async fn enqueue_deploy(
    publisher: &dyn MessagePublisher,
    settings: &DeployerSettings,
    job: &DeployJob,
) -> Result<(), DeployError> {
    enqueue_json(publisher, &settings.deploy_queue, job)
        .await
        .map_err(DeployError::Queue)?;
    tracing::info!(deployment_id = job.deployment_id, "Deploy job enqueued");
    Ok(())
}

pub async fn enqueue_build(
    publisher: &dyn MessagePublisher,
    settings: &DeployerSettings,
    job: &BuildJob,
) -> Result<(), DeployError> {
    enqueue_json(publisher, &settings.build_queue, job)
        .await
        .map_err(DeployError::Queue)?;
    tracing::info!(deployment_id = job.deployment_id, "Build job enqueued");
    Ok(())
}

pub struct ProjectLifecycle {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn MessagePublisher>,
    invalidator: Invalidator,
    tracker: Arc<dyn Tracker>,
    settings: DeployerSettings,
}

impl ProjectLifecycle {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
        tracker: Arc<dyn Tracker>,
        settings: DeployerSettings,
    ) -> Self {
        let invalidator = Invalidator::from_settings(publisher.clone(), &settings);
        Self {
            pool,
            store,
            publisher,
            invalidator,
            tracker,
            settings,
        }
    }

    /// Deletes the project with everything it owns, then the objects edges and
    /// the build pipeline could still find for it.
    #[tracing::instrument(name = "Destroy project", skip(self, project), fields(project_id = project.id))]
    pub async fn destroy_project(&self, project: &Project) -> Result<(), DeployError> {
        if project.is_locked() {
            return Err(DeployError::ProjectLocked(project.id));
        }

        let domains = db::domain::fetch_by_project(&self.pool, project.id)
            .await
            .map_err(DeployError::Database)?;
        let domain_names = project.domain_names(&domains, &self.settings.default_domain_suffix);
        let raw_bundles = db::raw_bundle::fetch_by_project(&self.pool, project.id)
            .await
            .map_err(DeployError::Database)?;

        let mut keys: Vec<String> = domain_names
            .iter()
            .map(|name| layout::domain_meta_key(name))
            .collect();
        keys.extend(domains.iter().flat_map(|domain| layout::cert_keys(&domain.name)));
        keys.extend(raw_bundles.into_iter().map(|bundle| bundle.uploaded_path));

        let mut tx = self.pool.begin().await?;
        let deleted = db::project::delete(&mut *tx, project.id)
            .await
            .map_err(DeployError::Database)?;
        if !deleted {
            return Err(DeployError::NotFound(format!("project {}", project.id)));
        }
        tx.commit().await?;

        self.store.delete(&keys).await?;
        self.invalidator.publish(&domain_names).await?;

        tracing::info!("Project {} deleted, removed {} object(s)", project.name, keys.len());

        if let Err(err) = self
            .tracker
            .track(
                project.user_id,
                "Deleted Project",
                json!({ "projectName": project.name }),
            )
            .await
        {
            tracing::warn!("Failed to track project deletion: {}", err);
        }
        Ok(())
    }

    /// Persists the change and brings the live pointer documents in line with it.
    #[tracing::instrument(name = "Apply project settings", skip(self, project), fields(project_id = project.id))]
    pub async fn apply_settings(
        &self,
        project: &Project,
        change: ProjectSettingsChange,
    ) -> Result<Project, DeployError> {
        if project.is_locked() {
            return Err(DeployError::ProjectLocked(project.id));
        }

        let mut updated = project.clone();
        if let Some(force_https) = change.force_https {
            updated.force_https = force_https;
        }
        if let Some(enabled) = change.default_domain_enabled {
            updated.default_domain_enabled = enabled;
        }
        if let Some(skip_build) = change.skip_build {
            updated.skip_build = skip_build;
        }
        match change.basic_auth {
            Some(Some((username, password))) => {
                updated.encrypted_basic_auth_password =
                    Some(Project::hash_basic_auth(&username, &password));
                updated.basic_auth_username = Some(username);
            }
            Some(None) => {
                updated.basic_auth_username = None;
                updated.encrypted_basic_auth_password = None;
            }
            None => {}
        }

        let saved = db::project::update_settings(&self.pool, &updated)
            .await
            .map_err(DeployError::Database)?;

        let active_deployment_id = match saved.active_deployment_id {
            Some(id) => id,
            None => return Ok(saved),
        };

        let default_domain = saved.default_domain_name(&self.settings.default_domain_suffix);
        if project.default_domain_enabled && !saved.default_domain_enabled {
            self.store
                .delete(&[layout::domain_meta_key(&default_domain)])
                .await?;
            self.invalidator.publish(&[default_domain.clone()]).await?;
        }

        let meta_changed = project.force_https != saved.force_https
            || project.basic_auth_digest() != saved.basic_auth_digest();
        let default_enabled = !project.default_domain_enabled && saved.default_domain_enabled;

        // one metadata-only redeploy covers both cases
        if meta_changed || default_enabled {
            let job = DeployJob {
                deployment_id: active_deployment_id,
                skip_webroot_upload: true,
                skip_invalidation: !meta_changed,
                use_raw_bundle: false,
            };
            enqueue_deploy(self.publisher.as_ref(), &self.settings, &job).await?;
        }

        Ok(saved)
    }

    /// New deployment of the live bundle with different JS env vars. Returns
    /// the active deployment untouched when nothing changed.
    #[tracing::instrument(name = "Redeploy with env vars", skip(self, project, env_vars), fields(project_id = project.id))]
    pub async fn redeploy_with_env_vars(
        &self,
        project: &Project,
        env_vars: Value,
        user_id: i32,
    ) -> Result<Deployment, DeployError> {
        if project.is_locked() {
            return Err(DeployError::ProjectLocked(project.id));
        }

        let active_id = project.active_deployment_id.ok_or_else(|| {
            DeployError::NotFound(format!("active deployment of project {}", project.id))
        })?;
        let active = deployment_state::load(&self.pool, active_id).await?;
        if active.js_env_vars == env_vars {
            return Ok(active);
        }

        let version = db::deployment::next_version(&self.pool, project.id)
            .await
            .map_err(DeployError::Database)?;
        let mut deployment = Deployment::new(project.id, user_id, version);
        deployment.raw_bundle_id = active.raw_bundle_id;
        deployment.js_env_vars = env_vars;
        deployment.state = DeploymentState::PendingBuild;

        let deployment = db::deployment::insert(&self.pool, deployment)
            .await
            .map_err(DeployError::Database)?;

        // without a shared raw bundle the build worker looks under the new prefix
        if deployment.raw_bundle_id.is_none() {
            self.store
                .copy(
                    &layout::raw_bundle_key(&active.prefix_id()),
                    &layout::raw_bundle_key(&deployment.prefix_id()),
                )
                .await?;
        }

        enqueue_build(
            self.publisher.as_ref(),
            &self.settings,
            &BuildJob {
                deployment_id: deployment.id,
            },
        )
        .await?;

        Ok(deployment)
    }
}
