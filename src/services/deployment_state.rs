//! Deployment state machine.
//!
//! Every write is a compare-and-swap on the state the caller last read, so a
//! duplicate delivery that lost the race observes `UnexpectedState` instead of
//! silently overwriting the winner.

use crate::db;
use crate::errors::DeployError;
use crate::models::{Deployment, DeploymentState, Project};
use sqlx::{PgConnection, PgPool};

fn unexpected(deployment_id: i32, state: DeploymentState) -> DeployError {
    DeployError::UnexpectedState {
        deployment_id,
        state,
    }
}

pub async fn load(pool: &PgPool, deployment_id: i32) -> Result<Deployment, DeployError> {
    db::deployment::fetch(pool, deployment_id)
        .await
        .map_err(DeployError::Database)?
        .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment_id)))
}

/// Moves `deployment` one legal step. On a lost race the deployment is
/// refreshed and the observed state is reported.
#[tracing::instrument(
    name = "Advance deployment state",
    skip(pool, deployment),
    fields(deployment_id = deployment.id, from = %deployment.state)
)]
pub async fn advance(
    pool: &PgPool,
    deployment: &mut Deployment,
    target: DeploymentState,
) -> Result<(), DeployError> {
    if !deployment.state.can_transition_to(target) {
        return Err(unexpected(deployment.id, deployment.state));
    }

    let swapped = db::deployment::update_state_if(pool, deployment.id, deployment.state, target)
        .await
        .map_err(DeployError::Database)?;

    if !swapped {
        *deployment = load(pool, deployment.id).await?;
        tracing::warn!("State moved underneath us, now {}", deployment.state);
        return Err(unexpected(deployment.id, deployment.state));
    }

    deployment.state = target;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, deployment: &mut Deployment) -> Result<(), DeployError> {
    advance(pool, deployment, DeploymentState::Failed).await
}

/// Guard run before any side effect of a deploy job.
pub fn ensure_publishable(
    deployment: &Deployment,
    project: &Project,
    skip_webroot_upload: bool,
) -> Result<(), DeployError> {
    match deployment.state {
        DeploymentState::PendingDeploy => Ok(()),
        // config-only redeploy, and only of the version that is still live
        DeploymentState::Deployed
            if skip_webroot_upload && project.active_deployment_id == Some(deployment.id) =>
        {
            Ok(())
        }
        state => Err(unexpected(deployment.id, state)),
    }
}

/// Marks the deployment deployed and repoints the project at it. Must run
/// inside a transaction; both rows change together or not at all. The
/// project pointer must still be the one in `project`.
pub async fn activate(
    tx: &mut PgConnection,
    project: &Project,
    deployment: &Deployment,
) -> Result<Deployment, DeployError> {
    let expected = deployment.state;
    if !matches!(
        expected,
        DeploymentState::PendingDeploy | DeploymentState::Deployed
    ) {
        return Err(unexpected(deployment.id, expected));
    }
    if deployment.project_id != project.id {
        return Err(DeployError::NotFound(format!(
            "deployment {} in project {}",
            deployment.id, project.id
        )));
    }
    if expected == DeploymentState::Deployed
        && project.active_deployment_id != Some(deployment.id)
    {
        return Err(unexpected(deployment.id, expected));
    }

    let deployed = match db::deployment::mark_deployed(&mut *tx, deployment.id, expected)
        .await
        .map_err(DeployError::Database)?
    {
        Some(deployed) => deployed,
        None => {
            let observed = db::deployment::fetch_state(&mut *tx, deployment.id)
                .await
                .map_err(DeployError::Database)?
                .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment.id)))?;
            return Err(unexpected(deployment.id, observed));
        }
    };

    let repointed = db::project::set_active_deployment(
        &mut *tx,
        project.id,
        project.active_deployment_id,
        deployment.id,
    )
    .await
    .map_err(DeployError::Database)?;
    if !repointed {
        tracing::warn!(
            deployment_id = deployment.id,
            project_id = project.id,
            "Active deployment moved underneath us"
        );
        return Err(unexpected(deployment.id, expected));
    }

    tracing::info!(
        deployment_id = deployment.id,
        project_id = project.id,
        "Deployment activated"
    );
    Ok(deployed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment_in(state: DeploymentState) -> Deployment {
        let mut deployment = Deployment::new(1, 1, 1);
        deployment.id = 42;
        deployment.state = state;
        deployment
    }

    fn project_serving(active_deployment_id: Option<i32>) -> Project {
        let mut project = Project::new(1, "foo".to_string());
        project.id = 1;
        project.active_deployment_id = active_deployment_id;
        project
    }

    #[test]
    fn pending_bundles_are_never_publishable() {
        for state in [DeploymentState::PendingUpload, DeploymentState::Uploaded] {
            for skip in [false, true] {
                assert!(matches!(
                    ensure_publishable(&deployment_in(state), &project_serving(None), skip),
                    Err(DeployError::UnexpectedState { deployment_id: 42, .. })
                ));
            }
        }
    }

    #[test]
    fn deployed_is_publishable_only_without_webroot_upload() {
        let deployed = deployment_in(DeploymentState::Deployed);
        let project = project_serving(Some(42));
        assert!(ensure_publishable(&deployed, &project, false).is_err());
        assert!(ensure_publishable(&deployed, &project, true).is_ok());
    }

    #[test]
    fn superseded_deployment_is_not_republished() {
        let deployed = deployment_in(DeploymentState::Deployed);
        for project in [project_serving(Some(43)), project_serving(None)] {
            assert!(matches!(
                ensure_publishable(&deployed, &project, true),
                Err(DeployError::UnexpectedState {
                    deployment_id: 42,
                    state: DeploymentState::Deployed,
                })
            ));
        }
    }

    #[test]
    fn pending_deploy_is_publishable() {
        let deployment = deployment_in(DeploymentState::PendingDeploy);
        let project = project_serving(Some(7));
        assert!(ensure_publishable(&deployment, &project, false).is_ok());
        assert!(ensure_publishable(&deployment, &project, true).is_ok());
    }

    #[test]
    fn build_and_failed_states_are_rejected() {
        let project = project_serving(Some(42));
        assert!(
            ensure_publishable(&deployment_in(DeploymentState::PendingBuild), &project, false)
                .is_err()
        );
        assert!(ensure_publishable(&deployment_in(DeploymentState::Failed), &project, true).is_err());
    }
}
