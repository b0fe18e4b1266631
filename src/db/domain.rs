use crate::models;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch_by_project(pool: &PgPool, project_id: i32) -> Result<Vec<models::Domain>, String> {
    let query_span = tracing::info_span!("Fetch domains by project id.");
    sqlx::query_as::<_, models::Domain>(
        r#"
        SELECT id, project_id, name, created_at
        FROM domains
        WHERE project_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch domains, error: {:?}", err);
        "Could not fetch domains".to_string()
    })
}

pub async fn insert(pool: &PgPool, domain: models::Domain) -> Result<models::Domain, String> {
    let query_span = tracing::info_span!("Saving new domain into the database");
    sqlx::query_as::<_, models::Domain>(
        r#"
        INSERT INTO domains (project_id, name, created_at)
        VALUES ($1, $2, $3)
        RETURNING id, project_id, name, created_at
        "#,
    )
    .bind(domain.project_id)
    .bind(&domain.name)
    .bind(domain.created_at)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|e| {
        tracing::error!("Failed to execute query: {:?}", e);
        "Failed to insert".to_string()
    })
}
