use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded, unoptimized bundle that several deployments may share.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct RawBundle {
    pub id: i32,
    pub project_id: i32,
    pub checksum: String,
    pub uploaded_path: String, // object store key
    pub created_at: DateTime<Utc>,
}

impl RawBundle {
    pub fn new(project_id: i32, checksum: String, uploaded_path: String) -> Self {
        Self {
            id: 0,
            project_id,
            checksum,
            uploaded_path,
            created_at: Utc::now(),
        }
    }
}
