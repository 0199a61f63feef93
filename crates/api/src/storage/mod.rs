//! Blob storage for review images.
//!
//! Images live in an object store under `review-images/`. The database only
//! keeps the public URL; [`BlobStore::key_for_url`] maps it back to the key
//! when an image is replaced or removed.
//!
//! # Backends
//!
//! - `s3` - Any S3-compatible service (AWS, `MinIO`, R2)
//! - `local` - A directory on disk, served by the API under `/uploads`
//! - `memory` - Process memory, for development and tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload,
};
use thiserror::Error;

use dongne_core::{ImageSlot, ReviewId};

use crate::config::{StorageBackend, StorageConfig};

/// Namespace for every review image key.
pub const REVIEW_IMAGE_PREFIX: &str = "review-images";

/// Errors from the blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be constructed from configuration.
    #[error("storage configuration error: {0}")]
    Config(String),

    /// Key is not a valid object path.
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The backend reported an error.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend did not answer in time.
    #[error("storage request timed out after {0:?}")]
    Timeout(Duration),
}

/// Minimal blob interface used by the media engine.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return its public URL.
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL for `key`.
    fn url_for(&self, key: &str) -> String;

    /// Key behind a URL produced by [`url_for`](Self::url_for), if it is one.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Unique key for a new image in `slot` of `review_id`.
#[must_use]
pub fn review_image_key(review_id: ReviewId, slot: ImageSlot, extension: &str) -> String {
    format!(
        "{REVIEW_IMAGE_PREFIX}/{review_id}/{}/{}.{extension}",
        slot.get(),
        uuid::Uuid::new_v4().simple()
    )
}

/// [`BlobStore`] backed by any `object_store` implementation.
#[derive(Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
    timeout: Duration,
    content_type_attributes: bool,
}

impl ObjectBlobStore {
    /// Wrap `store`. Public URLs are `{public_base_url}/{key}`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: &str, timeout: Duration) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
            timeout,
            content_type_attributes: false,
        }
    }

    /// Send the content type with each put. Only S3 and in-memory stores
    /// accept object attributes.
    #[must_use]
    pub const fn with_content_type_attributes(mut self) -> Self {
        self.content_type_attributes = true;
        self
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = object_store::Result<T>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn object_path(key: &str) -> Result<ObjectPath, StorageError> {
    ObjectPath::parse(key).map_err(|e| StorageError::InvalidKey {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = object_path(key)?;

        let mut attributes = Attributes::new();
        if self.content_type_attributes {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_owned()),
            );
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.timed(self.store.put_opts(&path, PutPayload::from(bytes), opts))
            .await?;
        tracing::debug!(key, content_type, "Blob stored");
        Ok(self.url_for(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = object_path(key)?;
        let result = tokio::time::timeout(self.timeout, self.store.delete(&path))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?;

        match result {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(key, "Blob deleted");
                Ok(())
            }
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| key.starts_with(REVIEW_IMAGE_PREFIX))
            .map(str::to_owned)
    }
}

/// Build the configured blob store.
///
/// # Errors
///
/// Returns `StorageError::Config` if the backend cannot be constructed.
pub fn build_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    let store = match &config.backend {
        StorageBackend::S3 {
            bucket,
            region,
            endpoint,
        } => {
            let s3 = build_s3(bucket, region, endpoint.as_deref(), config.timeout)?;
            ObjectBlobStore::new(s3, &config.public_base_url, config.timeout)
                .with_content_type_attributes()
        }
        StorageBackend::Local { root } => {
            ObjectBlobStore::new(build_local(root)?, &config.public_base_url, config.timeout)
        }
        StorageBackend::Memory => ObjectBlobStore::new(
            Arc::new(InMemory::new()),
            &config.public_base_url,
            config.timeout,
        )
        .with_content_type_attributes(),
    };
    Ok(Arc::new(store))
}

fn build_s3(
    bucket: &str,
    region: &str,
    endpoint: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    // Credentials come from the standard AWS_* variables.
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(region)
        .with_client_options(ClientOptions::new().with_timeout(timeout));

    if let Some(endpoint) = endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    let store = builder
        .build()
        .map_err(|e| StorageError::Config(format!("S3: {e}")))?;
    Ok(Arc::new(store))
}

fn build_local(root: &Path) -> Result<Arc<dyn ObjectStore>, StorageError> {
    std::fs::create_dir_all(root).map_err(|e| {
        StorageError::Config(format!(
            "failed to create storage directory '{}': {e}",
            root.display()
        ))
    })?;
    let absolute = root.canonicalize().map_err(|e| {
        StorageError::Config(format!(
            "failed to resolve storage directory '{}': {e}",
            root.display()
        ))
    })?;
    let store = LocalFileSystem::new_with_prefix(absolute)
        .map_err(|e| StorageError::Config(format!("LocalFileSystem: {e}")))?;
    Ok(Arc::new(store))
}
