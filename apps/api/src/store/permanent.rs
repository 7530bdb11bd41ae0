use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Provenance stored alongside a promoted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMetadata {
    pub artifact_id: Uuid,
    pub produced_at: DateTime<Utc>,
    pub generation_backend: String,
    pub render_backend: String,
    pub document_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permanent storage failed: {0}")]
pub struct StorageError(pub String);

/// Long-term document storage. Only the temporary store calls this, on promote.
#[async_trait]
pub trait PermanentStorage: Send + Sync {
    async fn store_permanently(
        &self,
        owner: &OwnerId,
        bytes: Bytes,
        metadata: &ArtifactMetadata,
    ) -> Result<DocumentId, StorageError>;
}

pub fn document_key(owner: &OwnerId, document_id: DocumentId, extension: &str) -> String {
    format!("documents/{owner}/{document_id}.{extension}")
}

/// S3 / MinIO backed permanent storage. The PDF and its LaTeX source are written
/// side by side under `documents/<owner>/`. A failed PDF upload removes the source
/// object again so no half-stored document is left behind.
#[derive(Clone)]
pub struct S3PermanentStore {
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl S3PermanentStore {
    pub fn new(s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    async fn remove_orphan(&self, key: &str) {
        let deleted = self
            .s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        if let Err(e) = deleted {
            warn!("Could not remove orphaned s3://{}/{key}: {e}", self.bucket);
        }
    }
}

#[async_trait]
impl PermanentStorage for S3PermanentStore {
    async fn store_permanently(
        &self,
        owner: &OwnerId,
        bytes: Bytes,
        metadata: &ArtifactMetadata,
    ) -> Result<DocumentId, StorageError> {
        let document_id = DocumentId::new();

        let source_key = document_key(owner, document_id, "tex");
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&source_key)
            .content_type("application/x-tex")
            .body(ByteStream::from(metadata.document_body.clone().into_bytes()))
            .send()
            .await
            .map_err(|e| StorageError(format!("S3 upload of {source_key} failed: {e}")))?;

        let pdf_key = document_key(owner, document_id, "pdf");
        let uploaded = self
            .s3
            .put_object()
            .bucket(&self.bucket)
            .key(&pdf_key)
            .content_type("application/pdf")
            .metadata("artifact-id", metadata.artifact_id.to_string())
            .metadata("produced-at", metadata.produced_at.to_rfc3339())
            .metadata("generation-backend", &metadata.generation_backend)
            .metadata("render-backend", &metadata.render_backend)
            .body(ByteStream::from(bytes))
            .send()
            .await;
        if let Err(e) = uploaded {
            self.remove_orphan(&source_key).await;
            return Err(StorageError(format!("S3 upload of {pdf_key} failed: {e}")));
        }

        info!("Stored document s3://{}/{}", self.bucket, pdf_key);
        Ok(document_id)
    }
}

#[cfg(test)]
pub use memory::InMemoryPermanentStore;
