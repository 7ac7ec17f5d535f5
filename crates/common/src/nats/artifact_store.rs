use crate::domain::{ArtifactStore, DomainError, DomainResult};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, object_store::ObjectMetadata, object_store::ObjectStore};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// ArtifactStore backed by JetStream object store buckets.
///
/// Buckets are opened (or created) on first use and cached.
pub struct NatsArtifactStore {
    jetstream: jetstream::Context,
    buckets: Mutex<HashMap<String, ObjectStore>>,
}

impl NatsArtifactStore {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self {
            jetstream,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    async fn bucket(&self, bucket_name: &str) -> Result<ObjectStore> {
        let mut buckets = self.buckets.lock().await;
        if let Some(store) = buckets.get(bucket_name) {
            return Ok(store.clone());
        }

        let store = match self.jetstream.get_object_store(bucket_name).await {
            Ok(store) => {
                debug!(bucket = %bucket_name, "object store bucket already exists");
                store
            }
            Err(_) => {
                debug!(bucket = %bucket_name, "creating object store bucket");
                self.jetstream
                    .create_object_store(jetstream::object_store::Config {
                        bucket: bucket_name.to_string(),
                        ..Default::default()
                    })
                    .await
                    .context("failed to create object store bucket")?
            }
        };

        buckets.insert(bucket_name.to_string(), store.clone());
        Ok(store)
    }
}

/// Reference handed back to callers for an uploaded object
pub fn artifact_reference(bucket: &str, name: &str) -> String {
    format!("nats-object://{}/{}", bucket, name)
}

/// Object metadata carrying the content type as a `Content-Type` header
pub fn object_metadata(name: &str, content_type: &str) -> ObjectMetadata {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE_HEADER, content_type);

    ObjectMetadata {
        name: name.to_string(),
        headers: Some(headers),
        ..Default::default()
    }
}

#[async_trait]
impl ArtifactStore for NatsArtifactStore {
    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        content: Bytes,
        content_type: &str,
    ) -> DomainResult<String> {
        let store = self
            .bucket(bucket)
            .await
            .map_err(|e| DomainError::UploadError(format!("{:#}", e)))?;

        let metadata = object_metadata(name, content_type);

        let mut reader = &content[..];
        let object = store
            .put(metadata, &mut reader)
            .await
            .map_err(|e| DomainError::UploadError(e.to_string()))?;

        info!(object = %name, size = object.size, "uploaded artifact");
        Ok(artifact_reference(bucket, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_reference() {
        assert_eq!(
            artifact_reference("decisions", "abc.jpg"),
            "nats-object://decisions/abc.jpg"
        );
    }

    #[test]
    fn test_object_metadata_carries_content_type_header() {
        let metadata = object_metadata("abc.jpg", "image/jpeg");

        assert_eq!(metadata.name, "abc.jpg");
        assert_eq!(metadata.description, None);
        let headers = metadata.headers.unwrap();
        assert_eq!(
            headers.get(CONTENT_TYPE_HEADER).map(|v| v.as_str()),
            Some("image/jpeg")
        );
    }
}
