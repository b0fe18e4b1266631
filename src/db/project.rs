use crate::models;
use sqlx::{PgConnection, PgPool};
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<models::Project>, String> {
    tracing::info!("Fetch project {}", id);
    sqlx::query_as::<_, models::Project>(
        r#"
        SELECT *
        FROM projects
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
            tracing::error!("Failed to fetch project, error: {:?}", e);
            Err("Could not fetch data".to_string())
        }
    })
}

pub async fn fetch_by_name(pool: &PgPool, name: &str) -> Result<Option<models::Project>, String> {
    let query_span = tracing::info_span!("Fetch one project by name.");
    sqlx::query_as::<_, models::Project>(
        r#"
        SELECT *
        FROM projects
        WHERE name=$1
        LIMIT 1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch one project by name, error: {:?}", err);
        "Could not fetch data".to_string()
    })
}

pub async fn insert(pool: &PgPool, project: models::Project) -> Result<models::Project, String> {
    let query_span = tracing::info_span!("Saving new project into the database");
    sqlx::query_as::<_, models::Project>(
        r#"
        INSERT INTO projects (
            name, user_id, force_https, skip_build, default_domain_enabled,
            basic_auth_username, encrypted_basic_auth_password, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&project.name)
    .bind(project.user_id)
    .bind(project.force_https)
    .bind(project.skip_build)
    .bind(project.default_domain_enabled)
    .bind(&project.basic_auth_username)
    .bind(&project.encrypted_basic_auth_password)
    .bind(project.created_at)
    .bind(project.updated_at)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|e| {
        tracing::error!("Failed to execute query: {:?}", e);
        "Failed to insert".to_string()
    })
}

/// Persists the user-editable flags. Never touches the active deployment pointer or the lock.
pub async fn update_settings(
    pool: &PgPool,
    project: &models::Project,
) -> Result<models::Project, String> {
    let query_span = tracing::info_span!("Updating project settings");
    sqlx::query_as::<_, models::Project>(
        r#"
        UPDATE projects
        SET
            force_https=$2,
            skip_build=$3,
            default_domain_enabled=$4,
            basic_auth_username=$5,
            encrypted_basic_auth_password=$6,
            updated_at=NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(project.id)
    .bind(project.force_https)
    .bind(project.skip_build)
    .bind(project.default_domain_enabled)
    .bind(&project.basic_auth_username)
    .bind(&project.encrypted_basic_auth_password)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map(|result| {
        tracing::info!("Project {} settings have been saved", project.id);
        result
    })
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        "Failed to update project".to_string()
    })
}

#[tracing::instrument(name = "Set project lock.", skip(pool))]
pub async fn set_locked(
    pool: &PgPool,
    id: i32,
    locked: bool,
) -> Result<Option<models::Project>, String> {
    sqlx::query_as::<_, models::Project>(
        r#"
        UPDATE projects
        SET locked_at = CASE WHEN $2 THEN COALESCE(locked_at, NOW()) ELSE NULL END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(locked)
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to set project lock: {:?}", err);
        "Failed to set project lock".to_string()
    })
}

/// Compare-and-swap on the pointer. `false` when it is no longer `expected`.
/// Must run inside the activation transaction.
pub async fn set_active_deployment(
    conn: &mut PgConnection,
    project_id: i32,
    expected: Option<i32>,
    deployment_id: i32,
) -> Result<bool, String> {
    let query_span = tracing::info_span!("Repointing project active deployment");
    let result = sqlx::query(
        r#"
        UPDATE projects
        SET active_deployment_id = $2, updated_at = NOW()
        WHERE id = $1 AND active_deployment_id IS NOT DISTINCT FROM $3
        "#,
    )
    .bind(project_id)
    .bind(deployment_id)
    .bind(expected)
    .execute(conn)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to set active deployment: {:?}", err);
        "Failed to set active deployment".to_string()
    })?;

    Ok(result.rows_affected() == 1)
}

/// Deployments, domains, certs and raw bundles go with it (ON DELETE CASCADE).
#[tracing::instrument(name = "Delete project.", skip(conn))]
pub async fn delete(conn: &mut PgConnection, id: i32) -> Result<bool, String> {
    // break the projects <-> deployments cycle before the cascade runs
    sqlx::query("UPDATE projects SET active_deployment_id = NULL WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            tracing::error!("Failed to clear active deployment: {:?}", err);
            "Failed to delete project".to_string()
        })?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map(|result| result.rows_affected() > 0)
        .map_err(|err| {
            tracing::error!("Failed to delete project: {:?}", err);
            "Failed to delete project".to_string()
        })
}
