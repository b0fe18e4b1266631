use super::{Acl, Location, ObjectStore, StorageError, UploadBody};
use crate::configuration::StorageSettings;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectCannedAcl, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// S3 refuses parts smaller than this, except the last one.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// DeleteObjects accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

pub struct S3Store {
    client: Client,
    location: Location,
    multipart_threshold: u64,
    part_size: u64,
    max_upload_size: u64,
}

impl S3Store {
    pub async fn new(settings: &StorageSettings) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        // MinIO / localstack
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            location: Location {
                region: settings.region.clone(),
                bucket: settings.bucket.clone(),
            },
            multipart_threshold: settings.multipart_threshold,
            part_size: settings.part_size.max(MIN_PART_SIZE),
            max_upload_size: settings.max_upload_size,
        }
    }

    fn bucket(&self) -> &str {
        &self.location.bucket
    }

    async fn put_single(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError> {
        let stream = match body {
            UploadBody::Bytes(bytes) => ByteStream::from(bytes),
            UploadBody::File(path) => ByteStream::from_path(&path)
                .await
                .map_err(|err| StorageError::Backend(err.to_string()))?,
        };

        self.client
            .put_object()
            .bucket(self.bucket())
            .key(key)
            .body(stream)
            .content_type(content_type)
            .acl(canned_acl(acl))
            .send()
            .await
            .map_err(|err| backend_error("PutObject", key, err))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: UploadBody,
        size: u64,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(self.bucket())
            .key(key)
            .content_type(content_type)
            .acl(canned_acl(acl))
            .send()
            .await
            .map_err(|err| backend_error("CreateMultipartUpload", key, err))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Backend(format!("no upload id returned for {}", key)))?
            .to_string();

        match self.upload_parts(key, &upload_id, body, size).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                let result = self
                    .client
                    .complete_multipart_upload()
                    .bucket(self.bucket())
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await;
                if let Err(err) = result {
                    self.abort(key, &upload_id).await;
                    return Err(backend_error("CompleteMultipartUpload", key, err));
                }
                Ok(())
            }
            Err(err) => {
                self.abort(key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: UploadBody,
        size: u64,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut file = match &body {
            UploadBody::File(path) => Some(tokio::fs::File::open(path).await?),
            UploadBody::Bytes(_) => None,
        };

        let mut completed = Vec::new();
        for (index, (offset, len)) in plan_parts(size, self.part_size).into_iter().enumerate() {
            let part_number = (index + 1) as i32;
            let chunk = match (&body, file.as_mut()) {
                (UploadBody::Bytes(bytes), _) => {
                    bytes.slice(offset as usize..(offset + len) as usize)
                }
                (UploadBody::File(_), Some(file)) => {
                    let mut buffer = vec![0u8; len as usize];
                    file.read_exact(&mut buffer).await?;
                    Bytes::from(buffer)
                }
                (UploadBody::File(path), None) => {
                    return Err(StorageError::Backend(format!(
                        "{} was not opened",
                        path.display()
                    )))
                }
            };

            let response = self
                .client
                .upload_part()
                .bucket(self.bucket())
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|err| backend_error("UploadPart", key, err))?;

            let etag = response.e_tag().ok_or_else(|| {
                StorageError::Backend(format!("no ETag returned for part {} of {}", part_number, key))
            })?;
            completed.push(
                CompletedPart::builder()
                    .e_tag(etag)
                    .part_number(part_number)
                    .build(),
            );
        }

        tracing::debug!("Uploaded {} parts for {}", completed.len(), key);
        Ok(completed)
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(self.bucket())
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "Failed to abort multipart upload {} for {}: {}",
                upload_id,
                key,
                DisplayErrorContext(&err)
            );
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn location(&self) -> &Location {
        &self.location
    }

    #[tracing::instrument(name = "S3 upload", skip(self, body))]
    async fn upload(
        &self,
        key: &str,
        body: UploadBody,
        content_type: &str,
        acl: Acl,
    ) -> Result<(), StorageError> {
        let size = body.len().await?;
        if size > self.max_upload_size {
            return Err(StorageError::TooLarge {
                size,
                max: self.max_upload_size,
            });
        }

        if size > self.multipart_threshold {
            self.put_multipart(key, body, size, content_type, acl).await
        } else {
            self.put_single(key, body, content_type, acl).await
        }
    }

    #[tracing::instrument(name = "S3 download", skip(self, dest))]
    async fn download(&self, key: &str, dest: &mut tokio::fs::File) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(self.bucket())
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(key.to_string())
                } else {
                    backend_error("GetObject", key, err)
                }
            })?;

        dest.set_len(0).await?;
        dest.rewind().await?;

        let mut body = output.body;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| StorageError::Backend(format!("reading {}: {}", key, err)))?
        {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;
        Ok(written)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| StorageError::Backend(err.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|err| StorageError::Backend(err.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(self.bucket())
                .delete(delete)
                .send()
                .await
                .map_err(|err| backend_error("DeleteObjects", &batch[0], err))?;

            if let Some(failure) = output.errors().first() {
                return Err(StorageError::Backend(format!(
                    "failed to delete {}: {}",
                    failure.key().unwrap_or_default(),
                    failure.message().unwrap_or("unknown error")
                )));
            }
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.client
            .copy_object()
            .bucket(self.bucket())
            .copy_source(format!("{}/{}", self.bucket(), src))
            .key(dst)
            .send()
            .await
            .map_err(|err| match err.code() {
                Some("NoSuchKey") => StorageError::NotFound(src.to_string()),
                _ => backend_error("CopyObject", src, err),
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(self.bucket())
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(err) => Err(backend_error("HeadObject", key, err)),
        }
    }
}

fn canned_acl(acl: Acl) -> ObjectCannedAcl {
    match acl {
        Acl::Private => ObjectCannedAcl::Private,
        Acl::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

fn backend_error<E: std::error::Error>(operation: &str, key: &str, err: E) -> StorageError {
    let message = format!("{} {}: {}", operation, key, DisplayErrorContext(&err));
    tracing::error!("{}", message);
    StorageError::Backend(message)
}

/// `(offset, length)` of every part; the last part carries the remainder.
pub(crate) fn plan_parts(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(1);
    let mut parts = Vec::new();
    let mut offset = 0;
    while offset < size {
        let len = part_size.min(size - offset);
        parts.push((offset, len));
        offset += len;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parts_splits_with_remainder() {
        assert_eq!(plan_parts(10, 4), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(plan_parts(8, 4), vec![(0, 4), (4, 4)]);
        assert_eq!(plan_parts(3, 4), vec![(0, 3)]);
        assert!(plan_parts(0, 4).is_empty());
    }

    #[test]
    fn plan_parts_for_a_bundle_over_the_threshold() {
        let part = 50 * 1024 * 1024;
        let parts = plan_parts(120 * 1024 * 1024, part);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], (2 * part, 20 * 1024 * 1024));
    }

    #[test]
    fn acl_maps_to_canned_acl() {
        assert_eq!(canned_acl(Acl::PublicRead), ObjectCannedAcl::PublicRead);
        assert_eq!(canned_acl(Acl::Private), ObjectCannedAcl::Private);
    }
}
