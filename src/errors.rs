use crate::connectors::StorageError;
use crate::helpers::bundle::BundleError;
use crate::models::DeploymentState;

/// How the worker treats a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient infrastructure failure; redeliver.
    Retryable,
    /// The job's assumptions about current state are false; drop it.
    Precondition,
    /// The job can never succeed.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deployment {deployment_id} is in unexpected state {state}")]
    UnexpectedState {
        deployment_id: i32,
        state: DeploymentState,
    },
    #[error("project {0} is locked")]
    ProjectLocked(i32),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeployError {
    pub fn class(&self) -> ErrorClass {
        match self {
            // retrying cannot shrink the file
            DeployError::Storage(StorageError::TooLarge { .. }) => ErrorClass::Fatal,
            DeployError::Storage(_)
            | DeployError::Queue(_)
            | DeployError::Database(_)
            | DeployError::Io(_) => ErrorClass::Retryable,
            DeployError::UnexpectedState { .. }
            | DeployError::ProjectLocked(_)
            | DeployError::NotFound(_) => ErrorClass::Precondition,
            DeployError::InvalidBundle(_) | DeployError::Serialization(_) => ErrorClass::Fatal,
        }
    }
}

impl From<BundleError> for DeployError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Invalid(msg) => DeployError::InvalidBundle(msg),
            BundleError::Io(err) => DeployError::Io(err),
        }
    }
}

impl From<sqlx::Error> for DeployError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        DeployError::Database(err.to_string())
    }
}
