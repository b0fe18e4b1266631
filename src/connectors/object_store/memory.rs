use super::{Acl, Location, ObjectStore, StorageError, UploadBody};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub acl: Acl,
}

/// Process-local store. Used by the `memory` backend and throughout the tests.
pub struct MemoryStore {
    location: Location,
    max_upload_size: Option<u64>,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            max_upload_size: None,
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_max_upload_size(mut self, max: u64) -> Self {
        self.max_upload_size = Some(max);
        self
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    /// All keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("memory store lock poisoned".to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(Location {
            region: "local".to_string(),
            bucket: "memory".to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn location(&self) -> &Location {
        &self.location
    }

    async fn upload(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError> {
        let size = body.len().await?;
        if let Some(max) = self.max_upload_size {
            if size > max {
                return Err(StorageError::TooLarge { size, max });
            }
        }

        let bytes = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };

        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body: bytes,
                content_type: content_type.to_string(),
                acl,
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str, dest: &mut tokio::fs::File) -> Result<u64, StorageError> {
        let body = self
            .get(key)
            .map(|object| object.body)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        dest.set_len(0).await?;
        dest.write_all(&body).await?;
        dest.flush().await?;
        Ok(body.len() as u64)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        let object = objects
            .get(src)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
        objects.insert(dst.to_string(), object);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        Ok(objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    #[tokio::test]
    async fn upload_then_download() {
        let store = MemoryStore::default();
        store
            .upload("a/b.txt", Bytes::from_static(b"hello").into(), "text/plain", Acl::PublicRead)
            .await
            .unwrap();

        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = tokio::fs::File::from_std(tmp.reopen().unwrap());
        let written = store.download("a/b.txt", &mut file).await.unwrap();
        assert_eq!(written, 5);

        file.rewind().await.unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "hello");

        let object = store.get("a/b.txt").unwrap();
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(object.acl, Acl::PublicRead);
    }

    #[tokio::test]
    async fn download_missing_key_is_not_found() {
        let store = MemoryStore::default();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = tokio::fs::File::from_std(tmp.reopen().unwrap());
        assert!(matches!(
            store.download("missing", &mut file).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upload_over_limit_is_rejected() {
        let store = MemoryStore::default().with_max_upload_size(4);
        let result = store
            .upload("big", Bytes::from_static(b"hello").into(), "text/plain", Acl::Private)
            .await;
        assert!(matches!(result, Err(StorageError::TooLarge { size: 5, max: 4 })));
        assert!(!store.exists("big").await.unwrap());
    }

    #[tokio::test]
    async fn upload_from_file() {
        let store = MemoryStore::default();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"<h1>hi</h1>").unwrap();

        store
            .upload(
                "index.html",
                UploadBody::File(tmp.path().to_path_buf()),
                "text/html",
                Acl::PublicRead,
            )
            .await
            .unwrap();
        assert_eq!(store.get("index.html").unwrap().body, Bytes::from_static(b"<h1>hi</h1>"));
    }

    #[tokio::test]
    async fn delete_copy_and_exists() {
        let store = MemoryStore::default();
        store
            .upload("src", Bytes::from_static(b"x").into(), "text/plain", Acl::Private)
            .await
            .unwrap();
        store.copy("src", "dst").await.unwrap();
        assert!(store.exists("dst").await.unwrap());

        store
            .delete(&["src".to_string(), "dst".to_string(), "never-existed".to_string()])
            .await
            .unwrap();
        assert!(store.keys().is_empty());
        assert!(matches!(store.copy("src", "x").await, Err(StorageError::NotFound(_))));
    }
}
