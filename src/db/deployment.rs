use crate::models::{self, DeploymentState};
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<models::Deployment>, String> {
    tracing::info!("Fetch deployment {}", id);
    sqlx::query_as::<_, models::Deployment>(
        r#"
        SELECT id, project_id, user_id, prefix, raw_bundle_id, version, state,
               js_env_vars, deployed_at, created_at, updated_at
        FROM deployments
        WHERE id=$1
        LIMIT 1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .map(Some)
    .or_else(|err| match err {
        sqlx::Error::RowNotFound => Ok(None),
        e => {
            tracing::error!("Failed to fetch deployment, error: {:?}", e);
            Err("Could not fetch data".to_string())
        }
    })
}

pub async fn fetch_by_project(
    pool: &PgPool,
    project_id: i32,
) -> Result<Vec<models::Deployment>, String> {
    let query_span = tracing::info_span!("Fetch deployments by project id.");
    sqlx::query_as::<_, models::Deployment>(
        r#"
        SELECT id, project_id, user_id, prefix, raw_bundle_id, version, state,
               js_env_vars, deployed_at, created_at, updated_at
        FROM deployments
        WHERE project_id = $1
        ORDER BY version DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch deployments, error: {:?}", err);
        "Could not fetch deployments".to_string()
    })
}

pub async fn insert(
    pool: &PgPool,
    deployment: models::Deployment,
) -> Result<models::Deployment, String> {
    let query_span = tracing::info_span!("Saving new deployment into the database");
    sqlx::query_as::<_, models::Deployment>(
        r#"
        INSERT INTO deployments (
            project_id, user_id, prefix, raw_bundle_id, version, state, js_env_vars,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, project_id, user_id, prefix, raw_bundle_id, version, state,
                  js_env_vars, deployed_at, created_at, updated_at
        "#,
    )
    .bind(deployment.project_id)
    .bind(deployment.user_id)
    .bind(&deployment.prefix)
    .bind(deployment.raw_bundle_id)
    .bind(deployment.version)
    .bind(deployment.state.as_str())
    .bind(&deployment.js_env_vars)
    .bind(deployment.created_at)
    .bind(deployment.updated_at)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|e| {
        tracing::error!("Failed to execute query: {:?}", e);
        "Failed to insert".to_string()
    })
}

pub async fn next_version(pool: &PgPool, project_id: i32) -> Result<i64, String> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM deployments WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to compute next version: {:?}", err);
        "Could not compute next version".to_string()
    })
}

/// Compare-and-swap on state. `false` means another writer moved the row first.
#[tracing::instrument(name = "Update deployment state", skip(pool))]
pub async fn update_state_if(
    pool: &PgPool,
    id: i32,
    expected: DeploymentState,
    target: DeploymentState,
) -> Result<bool, String> {
    sqlx::query(
        r#"
        UPDATE deployments
        SET state = $3, updated_at = NOW()
        WHERE id = $1 AND state = $2
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(target.as_str())
    .execute(pool)
    .await
    .map(|result| result.rows_affected() == 1)
    .map_err(|err| {
        tracing::error!("Failed to update deployment state: {:?}", err);
        "Failed to update deployment state".to_string()
    })
}

/// Marks the deployment deployed if it is still in `expected`. `deployed_at` is
/// only ever set once. Returns `None` when the state moved underneath us.
pub async fn mark_deployed(
    conn: &mut PgConnection,
    id: i32,
    expected: DeploymentState,
) -> Result<Option<models::Deployment>, String> {
    let query_span = tracing::info_span!("Marking deployment deployed");
    sqlx::query_as::<_, models::Deployment>(
        r#"
        UPDATE deployments
        SET state = 'deployed',
            deployed_at = COALESCE(deployed_at, NOW()),
            updated_at = NOW()
        WHERE id = $1 AND state = $2
        RETURNING id, project_id, user_id, prefix, raw_bundle_id, version, state,
                  js_env_vars, deployed_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .fetch_optional(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to mark deployment deployed: {:?}", err);
        "Failed to mark deployment deployed".to_string()
    })
}

/// Current state as seen from inside a transaction.
pub async fn fetch_state(
    conn: &mut PgConnection,
    id: i32,
) -> Result<Option<DeploymentState>, String> {
    let state = sqlx::query_scalar::<_, String>("SELECT state FROM deployments WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|err| {
            tracing::error!("Failed to fetch deployment state: {:?}", err);
            "Could not fetch deployment state".to_string()
        })?;

    state
        .map(|state| state.parse::<DeploymentState>())
        .transpose()
        .map_err(|err| err.to_string())
}
