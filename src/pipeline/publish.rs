//! Artifact publication: upload the verified GIF to durable object storage.
//!
//! ## Why a trait?
//!
//! The store client's HTTP/auth mechanics are opaque SDK territory; the
//! pipeline only needs "put this file under this key, give me its public
//! URL". [`ArtifactStore`] is that seam — integration tests substitute an
//! in-memory recorder, production wires up [`S3ArtifactStore`] once at
//! startup and shares it read-only across all jobs.
//!
//! The public URL is derived from configuration, never read back from the
//! store: given the base address and the key, the address of a published
//! object is fully determined.

use crate::error::ConvertError;
use crate::job::ARTIFACT_FILENAME;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::{debug, info};

/// Capability to publish a local artifact under a deterministic key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the file at `local_path` under `key` and return its public
    /// URL. Store-side failures surface as
    /// [`ConvertError::PublishFailure`] with the store's diagnostic
    /// attached.
    async fn publish(&self, local_path: &Path, key: &str) -> Result<String, ConvertError>;

    /// One-shot reachability check, run once at process start — never per
    /// request.
    async fn health_check(&self) -> Result<(), ConvertError>;
}

/// S3-backed artifact store.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ArtifactStore {
    /// Build the store from the ambient AWS environment (region and
    /// credentials from the standard provider chain).
    pub async fn connect(bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Build the store around an existing client, e.g. one pointed at a
    /// custom endpoint.
    pub fn with_client(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn publish(&self, local_path: &Path, key: &str) -> Result<String, ConvertError> {
        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            ConvertError::PublishFailure {
                detail: format!("failed to read '{}': {e}", local_path.display()),
            }
        })?;

        debug!(bucket = %self.bucket, key, "uploading artifact");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type("image/gif")
            .content_disposition(format!("inline; filename=\"{ARTIFACT_FILENAME}\""))
            .send()
            .await
            .map_err(|e| ConvertError::PublishFailure {
                detail: format!("{}", DisplayErrorContext(&e)),
            })?;

        let url = public_url(&self.public_base_url, key);
        info!(bucket = %self.bucket, key, %url, "artifact published");
        Ok(url)
    }

    async fn health_check(&self) -> Result<(), ConvertError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| ConvertError::PublishFailure {
                detail: format!("bucket '{}' not reachable: {}", self.bucket, DisplayErrorContext(&e)),
            })?;
        Ok(())
    }
}

/// Join the configured base address with an object key.
pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}
