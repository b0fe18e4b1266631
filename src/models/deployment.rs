use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Lifecycle of a deployment, initial to terminal:
/// `pending_upload -> uploaded -> pending_build -> pending_deploy -> deployed`,
/// with `failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    PendingUpload,
    Uploaded,
    PendingBuild,
    PendingDeploy,
    Deployed,
    Failed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::PendingUpload => "pending_upload",
            DeploymentState::Uploaded => "uploaded",
            DeploymentState::PendingBuild => "pending_build",
            DeploymentState::PendingDeploy => "pending_deploy",
            DeploymentState::Deployed => "deployed",
            DeploymentState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Deployed | DeploymentState::Failed)
    }

    /// The bundle has not finished uploading; nothing can be published yet.
    pub fn is_bundle_pending(&self) -> bool {
        matches!(
            self,
            DeploymentState::PendingUpload | DeploymentState::Uploaded
        )
    }

    /// Only single forward steps are legal, plus any non-terminal state into `failed`.
    pub fn can_transition_to(&self, target: DeploymentState) -> bool {
        use DeploymentState::*;
        match (self, target) {
            (PendingUpload, Uploaded)
            | (Uploaded, PendingBuild)
            | (PendingBuild, PendingDeploy)
            | (PendingDeploy, Deployed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown deployment state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for DeploymentState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_upload" => Ok(DeploymentState::PendingUpload),
            "uploaded" => Ok(DeploymentState::Uploaded),
            "pending_build" => Ok(DeploymentState::PendingBuild),
            "pending_deploy" => Ok(DeploymentState::PendingDeploy),
            "deployed" => Ok(DeploymentState::Deployed),
            "failed" => Ok(DeploymentState::Failed),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

impl TryFrom<String> for DeploymentState {
    type Error = UnknownState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One immutable attempt to publish a project. Config changes create a new row.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Deployment {
    pub id: i32,
    pub project_id: i32,
    pub user_id: i32, // initiator
    pub prefix: String,
    pub raw_bundle_id: Option<i32>,
    pub version: i64, // monotonic per project
    #[sqlx(try_from = "String")]
    pub state: DeploymentState,
    pub js_env_vars: Value,
    pub deployed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(project_id: i32, user_id: i32, version: i64) -> Self {
        Self {
            id: 0,
            project_id,
            user_id,
            prefix: generate_prefix(),
            raw_bundle_id: None,
            version,
            state: DeploymentState::PendingUpload,
            js_env_vars: Value::Object(Default::default()),
            deployed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Storage path segment unique to this deployment: `<prefix>-<id>`.
    pub fn prefix_id(&self) -> String {
        format!("{}-{}", self.prefix, self.id)
    }
}

fn generate_prefix() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}
