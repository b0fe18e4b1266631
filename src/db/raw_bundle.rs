use crate::models;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<models::RawBundle>, String> {
    sqlx::query_as::<_, models::RawBundle>(
        r#"
        SELECT id, project_id, checksum, uploaded_path, created_at
        FROM raw_bundles
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch raw bundle, error: {:?}", err);
        "Could not fetch raw bundle".to_string()
    })
}

pub async fn fetch_by_project(
    pool: &PgPool,
    project_id: i32,
) -> Result<Vec<models::RawBundle>, String> {
    let query_span = tracing::info_span!("Fetch raw bundles by project id.");
    sqlx::query_as::<_, models::RawBundle>(
        r#"
        SELECT id, project_id, checksum, uploaded_path, created_at
        FROM raw_bundles
        WHERE project_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch raw bundles, error: {:?}", err);
        "Could not fetch raw bundles".to_string()
    })
}

pub async fn insert(pool: &PgPool, bundle: models::RawBundle) -> Result<models::RawBundle, String> {
    let query_span = tracing::info_span!("Saving new raw bundle into the database");
    sqlx::query_as::<_, models::RawBundle>(
        r#"
        INSERT INTO raw_bundles (project_id, checksum, uploaded_path, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, project_id, checksum, uploaded_path, created_at
        "#,
    )
    .bind(bundle.project_id)
    .bind(&bundle.checksum)
    .bind(&bundle.uploaded_path)
    .bind(bundle.created_at)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|e| {
        tracing::error!("Failed to execute query: {:?}", e);
        "Failed to insert".to_string()
    })
}
