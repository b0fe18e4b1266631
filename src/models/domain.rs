use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An explicit hostname bound to a project, in addition to its default domain.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Domain {
    pub id: i32,
    pub project_id: i32,
    pub name: String, // fully-qualified, globally unique
    pub created_at: DateTime<Utc>,
}

impl Domain {
    pub fn new(project_id: i32, name: String) -> Self {
        Self {
            id: 0,
            project_id,
            name: name.to_lowercase(),
            created_at: Utc::now(),
        }
    }
}
