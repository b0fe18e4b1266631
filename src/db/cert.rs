use crate::models;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch_by_domains(
    pool: &PgPool,
    domain_ids: &[i32],
) -> Result<Vec<models::Cert>, String> {
    if domain_ids.is_empty() {
        return Ok(vec![]);
    }
    let query_span = tracing::info_span!("Fetch certs by domain ids.");
    sqlx::query_as::<_, models::Cert>(
        r#"
        SELECT *
        FROM certs
        WHERE domain_id = ANY($1)
        ORDER BY domain_id ASC
        "#,
    )
    .bind(domain_ids)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch certs, error: {:?}", err);
        "Could not fetch certs".to_string()
    })
}

pub async fn insert(pool: &PgPool, cert: models::Cert) -> Result<models::Cert, String> {
    let query_span = tracing::info_span!("Saving new cert into the database");
    sqlx::query_as::<_, models::Cert>(
        r#"
        INSERT INTO certs (
            domain_id, certificate, private_key, letsencrypt_key, cert_uri,
            http_challenge_path, http_challenge_resource, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(cert.domain_id)
    .bind(&cert.certificate)
    .bind(&cert.private_key)
    .bind(&cert.letsencrypt_key)
    .bind(&cert.cert_uri)
    .bind(&cert.http_challenge_path)
    .bind(&cert.http_challenge_resource)
    .bind(cert.created_at)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|e| {
        tracing::error!("Failed to execute query: {:?}", e);
        "Failed to insert".to_string()
    })
}
