//! Per-owner temporary artifact slots.
//!
//! Each owner has at most one [`TempArtifact`]. A publish swaps the slot's `Arc` in a
//! single map write, so readers see either the previous artifact or the new one and
//! never an empty or doubled slot. `publish` and `promote` additionally take a
//! per-owner async lock, which serializes writers for one owner while leaving other
//! owners independent. A lock is dropped from the map once nobody holds or awaits it.

pub mod permanent;

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{CustomizationRequest, OwnerId};

pub use permanent::{ArtifactMetadata, DocumentId, PermanentStorage, S3PermanentStore, StorageError};

#[cfg(test)]
pub use permanent::InMemoryPermanentStore;

/// Immutable once published. Handed out as `Arc<TempArtifact>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    pub artifact_id: Uuid,
    pub owner: OwnerId,
    pub bytes: Bytes,
    pub produced_at: DateTime<Utc>,
    pub source_request: CustomizationRequest,
    pub document_body: String,
    pub render_backend: String,
}

impl TempArtifact {
    fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            artifact_id: self.artifact_id,
            produced_at: self.produced_at,
            generation_backend: self.source_request.backend_id.clone(),
            render_backend: self.render_backend.clone(),
            document_body: self.document_body.clone(),
        }
    }
}

/// Everything `publish` needs besides the owner.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub bytes: Bytes,
    pub source_request: CustomizationRequest,
    pub document_body: String,
    pub render_backend: String,
}

/// Returned by a successful promote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermanentArtifactHandle {
    pub document_id: DocumentId,
    pub artifact_id: Uuid,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("refusing to publish an empty artifact")]
    Empty,

    #[error("artifact is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no temporary artifact for owner {0}")]
    NotFound(OwnerId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct TempArtifactStore {
    slots: DashMap<OwnerId, Arc<TempArtifact>>,
    writers: DashMap<OwnerId, Arc<Mutex<()>>>,
    permanent: Arc<dyn PermanentStorage>,
    max_bytes: usize,
}

impl TempArtifactStore {
    pub fn new(permanent: Arc<dyn PermanentStorage>, max_bytes: usize) -> Self {
        Self {
            slots: DashMap::new(),
            writers: DashMap::new(),
            permanent,
            max_bytes,
        }
    }

    fn writer_lock(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.writers
                .entry(owner.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drops the owner's lock once the map holds the only reference. Callers must
    /// have released their own clone first.
    fn release_writer(&self, owner: &OwnerId) {
        self.writers
            .remove_if(owner, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Replaces the owner's artifact with a new one built from `artifact`.
    pub async fn publish(
        &self,
        owner: &OwnerId,
        artifact: NewArtifact,
    ) -> Result<Arc<TempArtifact>, PublishError> {
        let size = artifact.bytes.len();
        if size == 0 {
            return Err(PublishError::Empty);
        }
        if size > self.max_bytes {
            return Err(PublishError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let lock = self.writer_lock(owner);
        let held = lock.lock().await;

        let published = Arc::new(TempArtifact {
            artifact_id: Uuid::new_v4(),
            owner: owner.clone(),
            bytes: artifact.bytes,
            produced_at: Utc::now(),
            source_request: artifact.source_request,
            document_body: artifact.document_body,
            render_backend: artifact.render_backend,
        });

        let previous = self.slots.insert(owner.clone(), Arc::clone(&published));
        drop(held);
        drop(lock);
        self.release_writer(owner);

        match previous {
            Some(old) => info!(
                "Replaced artifact {} with {} for {owner} ({size} bytes)",
                old.artifact_id, published.artifact_id
            ),
            None => info!(
                "Published artifact {} for {owner} ({size} bytes)",
                published.artifact_id
            ),
        }
        Ok(published)
    }

    pub fn get(&self, owner: &OwnerId) -> Result<Arc<TempArtifact>, StoreError> {
        self.slots
            .get(owner)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| StoreError::NotFound(owner.clone()))
    }

    /// Hands the owner's artifact to permanent storage, then clears the slot.
    /// The slot is left untouched if storage fails.
    pub async fn promote(&self, owner: &OwnerId) -> Result<PermanentArtifactHandle, StoreError> {
        let lock = self.writer_lock(owner);
        let held = lock.lock().await;
        let result = self.promote_locked(owner).await;
        drop(held);
        drop(lock);
        self.release_writer(owner);
        result
    }

    async fn promote_locked(&self, owner: &OwnerId) -> Result<PermanentArtifactHandle, StoreError> {
        let artifact = self.get(owner)?;
        let document_id = self
            .permanent
            .store_permanently(owner, artifact.bytes.clone(), &artifact.metadata())
            .await
            .map_err(|e| {
                warn!("Promote of artifact {} for {owner} failed: {e}", artifact.artifact_id);
                e
            })?;

        self.slots.remove(owner);
        info!(
            "Promoted artifact {} for {owner} to document {document_id}",
            artifact.artifact_id
        );
        Ok(PermanentArtifactHandle {
            document_id,
            artifact_id: artifact.artifact_id,
            promoted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_request, SAMPLE_LATEX};

    const LIMIT: usize = 1024;

    fn store() -> (TempArtifactStore, Arc<InMemoryPermanentStore>) {
        let permanent = Arc::new(InMemoryPermanentStore::default());
        (TempArtifactStore::new(permanent.clone(), LIMIT), permanent)
    }

    fn artifact(bytes: &[u8]) -> NewArtifact {
        NewArtifact {
            bytes: Bytes::copy_from_slice(bytes),
            source_request: sample_request("claude"),
            document_body: SAMPLE_LATEX.to_string(),
            render_backend: "pdflatex".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_without_publish_is_not_found() {
        let (store, _) = store();
        let owner = OwnerId::from("u1");
        assert_eq!(store.get(&owner).unwrap_err(), StoreError::NotFound(owner));
    }

    #[tokio::test]
    async fn test_publish_replaces_previous_artifact() {
        let (store, _) = store();
        let owner = OwnerId::from("u1");

        let first = store.publish(&owner, artifact(b"%PDF-first")).await.unwrap();
        let second = store.publish(&owner, artifact(b"%PDF-second")).await.unwrap();

        assert_ne!(first.artifact_id, second.artifact_id);
        let current = store.get(&owner).unwrap();
        assert_eq!(current.artifact_id, second.artifact_id);
        assert_eq!(&current.bytes[..], b"%PDF-second");
        // The old handle is still intact for whoever holds it.
        assert_eq!(&first.bytes[..], b"%PDF-first");
    }

    #[tokio::test]
    async fn test_repeated_get_returns_identical_bytes() {
        let (store, _) = store();
        let owner = OwnerId::from("u1");
        store.publish(&owner, artifact(b"%PDF-stable")).await.unwrap();

        let a = store.get(&owner).unwrap();
        let b = store.get(&owner).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.artifact_id, b.artifact_id);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized_blobs() {
        let (store, _) = store();
        let owner = OwnerId::from("u1");

        assert_eq!(
            store.publish(&owner, artifact(b"")).await.unwrap_err(),
            PublishError::Empty
        );
        assert_eq!(
            store
                .publish(&owner, artifact(&vec![b'x'; LIMIT + 1]))
                .await
                .unwrap_err(),
            PublishError::TooLarge {
                size: LIMIT + 1,
                limit: LIMIT
            }
        );
        assert!(store.get(&owner).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_leave_exactly_one_intact_artifact() {
        let (store, _) = store();
        let store = Arc::new(store);
        let owner = OwnerId::from("u1");

        let payloads: Vec<Vec<u8>> = (0..32u8).map(|i| vec![i; 64]).collect();
        let tasks: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|payload| {
                let store = Arc::clone(&store);
                let owner = owner.clone();
                tokio::spawn(async move { store.publish(&owner, artifact(&payload)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let current = store.get(&owner).unwrap();
        assert!(payloads.iter().any(|p| p[..] == current.bytes[..]));
        assert_eq!(store.slots.len(), 1);
        assert!(store.writers.is_empty());
    }

    #[tokio::test]
    async fn test_writer_locks_do_not_accumulate_per_owner() {
        let (store, permanent) = store();
        for i in 0..10 {
            let owner = OwnerId::from(format!("user-{i}").as_str());
            store.publish(&owner, artifact(b"%PDF-x")).await.unwrap();
        }
        store.promote(&OwnerId::from("user-0")).await.unwrap();
        permanent.set_failing(true);
        store.promote(&OwnerId::from("user-1")).await.unwrap_err();
        store.promote(&OwnerId::from("nobody")).await.unwrap_err();

        assert!(store.writers.is_empty());
        assert_eq!(store.slots.len(), 9);
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let (store, _) = store();
        store
            .publish(&OwnerId::from("a"), artifact(b"%PDF-a"))
            .await
            .unwrap();
        store
            .publish(&OwnerId::from("b"), artifact(b"%PDF-b"))
            .await
            .unwrap();

        assert_eq!(&store.get(&OwnerId::from("a")).unwrap().bytes[..], b"%PDF-a");
        assert_eq!(&store.get(&OwnerId::from("b")).unwrap().bytes[..], b"%PDF-b");
    }

    #[tokio::test]
    async fn test_promote_moves_artifact_to_permanent_storage() {
        let (store, permanent) = store();
        let owner = OwnerId::from("u1");
        let published = store.publish(&owner, artifact(b"%PDF-keep")).await.unwrap();

        let handle = store.promote(&owner).await.unwrap();

        assert_eq!(handle.artifact_id, published.artifact_id);
        assert!(store.get(&owner).is_err());
        let documents = permanent.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_id, handle.document_id);
        assert_eq!(documents[0].owner, owner);
        assert_eq!(&documents[0].bytes[..], b"%PDF-keep");
        assert_eq!(documents[0].metadata.document_body, SAMPLE_LATEX);
        assert_eq!(documents[0].metadata.render_backend, "pdflatex");
    }

    #[tokio::test]
    async fn test_failed_promote_keeps_the_slot() {
        let (store, permanent) = store();
        let owner = OwnerId::from("u1");
        let published = store.publish(&owner, artifact(b"%PDF-keep")).await.unwrap();
        permanent.set_failing(true);

        let err = store.promote(&owner).await.unwrap_err();

        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.get(&owner).unwrap().artifact_id, published.artifact_id);
        assert!(permanent.documents().is_empty());
    }

    #[tokio::test]
    async fn test_promote_without_artifact_is_not_found() {
        let (store, permanent) = store();
        let owner = OwnerId::from("u1");
        assert_eq!(
            store.promote(&owner).await.unwrap_err(),
            StoreError::NotFound(owner)
        );
        assert!(permanent.documents().is_empty());
    }
}
