//! Object Store connector
//!
//! Key-addressed blob storage for bundles, webroots and per-domain pointer
//! documents. Pipeline code only ever sees `Arc<dyn ObjectStore>`; the backend
//! is picked from `storage.backend` in configuration.

use crate::configuration::StorageSettings;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

pub mod layout;
pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Canned ACL applied to an uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
    PublicRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

/// Region and bucket every key of a client is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub region: String,
    pub bucket: String,
}

/// Upload source. Files are streamed part by part, never read whole by S3.
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl UploadBody {
    pub async fn len(&self) -> Result<u64, StorageError> {
        match self {
            UploadBody::Bytes(bytes) => Ok(bytes.len() as u64),
            UploadBody::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(bytes: Bytes) -> Self {
        UploadBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(bytes: Vec<u8>) -> Self {
        UploadBody::Bytes(Bytes::from(bytes))
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn location(&self) -> &Location;

    /// The object becomes visible under `key` only once the whole body is stored.
    async fn upload(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError>;

    /// Writes the object into `dest` from offset 0 and returns the byte count.
    async fn download(&self, key: &str, dest: &mut tokio::fs::File) -> Result<u64, StorageError>;

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

pub async fn init(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let location = Location {
        region: settings.region.clone(),
        bucket: settings.bucket.clone(),
    };

    match settings.backend.as_str() {
        "s3" => {
            let store = S3Store::new(settings).await;
            tracing::info!(
                region = %location.region,
                bucket = %location.bucket,
                "S3 object store initialized"
            );
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::warn!("Using in-memory object store; uploads will not survive a restart");
            Ok(Arc::new(
                MemoryStore::new(location).with_max_upload_size(settings.max_upload_size),
            ))
        }
        other => Err(StorageError::Backend(format!(
            "unsupported storage backend: {}",
            other
        ))),
    }
}
