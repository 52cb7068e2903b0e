use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use gasset_types::{
    ClientOptions, ManifestId, Policy, PolicyTarget, PolicyTree, SnapshotManifest, SourceInfo,
};

use crate::blocking;
use crate::error::{BackendError, BackendResult};
use crate::retention::expired_manifests;
use crate::storage::FsStorage;
use crate::traits::{Repository, RepositoryWriter};
use crate::upload::Uploader;

fn manifest_prefix(source: &SourceInfo) -> String {
    format!("manifests/{}/", source.storage_key())
}

fn manifest_blob_id(manifest: &SnapshotManifest) -> String {
    format!("{}{}.json", manifest_prefix(&manifest.source), manifest.id)
}

fn policy_blob_id(target: &PolicyTarget) -> String {
    format!("policies/{}.json", target.storage_key())
}

/// An open session on a filesystem repository.
pub struct FsRepository {
    storage: FsStorage,
    connection_path: PathBuf,
    client_options: ClientOptions,
    closed: AtomicBool,
    cancel: Arc<AtomicBool>,
}

impl FsRepository {
    pub(crate) fn new(
        storage: FsStorage,
        connection_path: PathBuf,
        client_options: ClientOptions,
    ) -> Self {
        Self {
            storage,
            connection_path,
            client_options,
            closed: AtomicBool::new(false),
            cancel: Arc::default(),
        }
    }

    pub(crate) fn with_cancel(self, cancel: Arc<AtomicBool>) -> Self {
        Self { cancel, ..self }
    }

    pub fn storage(&self) -> &FsStorage {
        &self.storage
    }

    pub fn connection_path(&self) -> &Path {
        &self.connection_path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Repository for FsRepository {
    type Writer = FsWriter;

    fn client_options(&self) -> &ClientOptions {
        &self.client_options
    }

    async fn new_writer(&self, purpose: &str) -> BackendResult<FsWriter> {
        if self.is_closed() {
            return Err(BackendError::NotConnected(self.connection_path.clone()));
        }
        debug!(purpose, "opening write session");
        Ok(FsWriter {
            storage: self.storage.clone(),
            purpose: purpose.to_string(),
            pending: Mutex::new(Pending::default()),
            cancel: self.cancel.clone(),
        })
    }

    async fn close(&self) -> BackendResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(root = %self.storage.root().display(), "repository closed");
        }
        Ok(())
    }
}

/// Writes staged in a session and not yet flushed.
#[derive(Default)]
struct Pending {
    manifests: Vec<SnapshotManifest>,
    policies: HashMap<String, Policy>,
    deleted: Vec<(ManifestId, String)>,
}

impl Pending {
    fn is_deleted(&self, id: &ManifestId) -> bool {
        self.deleted.iter().any(|(d, _)| d == id)
    }
}

/// Write session on a filesystem repository.
///
/// Saved manifests, policy changes and expirations are staged in memory and
/// written by [`RepositoryWriter::flush`]. Reads inside the session see the
/// staged state.
pub struct FsWriter {
    storage: FsStorage,
    purpose: String,
    pending: Mutex<Pending>,
    cancel: Arc<AtomicBool>,
}

impl FsWriter {
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    async fn read_json<T>(&self, id: String) -> BackendResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let storage = self.storage.clone();
        blocking(move || match storage.get_blob(&id)? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| BackendError::Corrupt {
                    what: id.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        })
        .await
    }

    async fn stored_manifests(&self, source: &SourceInfo) -> BackendResult<Vec<SnapshotManifest>> {
        let storage = self.storage.clone();
        let prefix = manifest_prefix(source);
        blocking(move || {
            let mut manifests = Vec::new();
            for blob in storage.list(&prefix, None)? {
                let Some(data) = storage.get_blob(&blob.id)? else {
                    continue;
                };
                let manifest: SnapshotManifest =
                    serde_json::from_slice(&data).map_err(|e| BackendError::Corrupt {
                        what: blob.id.clone(),
                        reason: e.to_string(),
                    })?;
                manifests.push(manifest);
            }
            Ok(manifests)
        })
        .await
    }

    async fn stored_policy(&self, target: &PolicyTarget) -> BackendResult<Option<Policy>> {
        let blob_id = policy_blob_id(target);
        if let Some(policy) = self.pending.lock().await.policies.get(&blob_id) {
            return Ok(Some(policy.clone()));
        }
        self.read_json(blob_id).await
    }
}

#[async_trait]
impl RepositoryWriter for FsWriter {
    async fn list_snapshots(&self, source: &SourceInfo) -> BackendResult<Vec<SnapshotManifest>> {
        let mut manifests = self.stored_manifests(source).await?;
        let pending = self.pending.lock().await;
        manifests.retain(|m| !pending.is_deleted(&m.id));
        manifests.extend(
            pending
                .manifests
                .iter()
                .filter(|m| &m.source == source)
                .cloned(),
        );
        debug!(source = %source, count = manifests.len(), "listed snapshots");
        Ok(manifests)
    }

    async fn policy_tree(&self, source: &SourceInfo) -> BackendResult<PolicyTree> {
        let global = self.stored_policy(&PolicyTarget::Global).await?;
        let defined = self
            .stored_policy(&PolicyTarget::Source(source.clone()))
            .await?;
        Ok(PolicyTree::build(global.as_ref(), defined.as_ref()))
    }

    async fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> BackendResult<()> {
        debug!(target = %target, "staging policy");
        self.pending
            .lock()
            .await
            .policies
            .insert(policy_blob_id(target), policy.clone());
        Ok(())
    }

    async fn upload(
        &self,
        path: &Path,
        policy: &PolicyTree,
        source: &SourceInfo,
        previous: &[SnapshotManifest],
    ) -> BackendResult<SnapshotManifest> {
        let storage = self.storage.clone();
        let policy = policy.effective_policy().clone();
        let path = path.to_path_buf();
        let source = source.clone();
        let previous = previous.to_vec();
        let cancel = self.cancel.clone();
        blocking(move || {
            Uploader::new(&storage, &policy)
                .with_cancel(&cancel)
                .with_previous(&previous)?
                .upload(&path, &source)
        })
        .await
    }

    async fn save_snapshot(&self, manifest: &SnapshotManifest) -> BackendResult<ManifestId> {
        let blob_id = manifest_blob_id(manifest);
        let mut pending = self.pending.lock().await;
        let staged = pending.manifests.iter().any(|m| m.id == manifest.id);
        let storage = self.storage.clone();
        let check_id = blob_id.clone();
        let stored = blocking(move || storage.blob_exists(&check_id)).await?;
        if staged || stored {
            return Err(BackendError::AlreadyExists(blob_id));
        }
        pending.manifests.push(manifest.clone());
        debug!(id = %manifest.id, source = %manifest.source, "staged snapshot manifest");
        Ok(manifest.id)
    }

    async fn apply_retention(&self, source: &SourceInfo) -> BackendResult<Vec<ManifestId>> {
        let tree = self.policy_tree(source).await?;
        let manifests = self.list_snapshots(source).await?;
        let mut pending = self.pending.lock().await;
        // Manifests saved in this session are never pruned by it.
        let expired: Vec<ManifestId> =
            expired_manifests(&manifests, &tree.effective_policy().retention)
                .into_iter()
                .filter(|id| !pending.manifests.iter().any(|m| &m.id == id))
                .collect();
        if expired.is_empty() {
            return Ok(expired);
        }

        for id in &expired {
            if let Some(m) = manifests.iter().find(|m| &m.id == id) {
                pending.deleted.push((*id, manifest_blob_id(m)));
            }
        }
        info!(source = %source, expired = expired.len(), "retention expired snapshots");
        Ok(expired)
    }

    async fn flush(&self) -> BackendResult<()> {
        let mut pending = self.pending.lock().await;
        let staged = std::mem::take(&mut *pending);
        let storage = self.storage.clone();
        let result = blocking(move || {
            for manifest in &staged.manifests {
                storage.put_blob(&manifest_blob_id(manifest), &serde_json::to_vec_pretty(manifest)?)?;
            }
            for (blob_id, policy) in &staged.policies {
                storage.put_blob(blob_id, &serde_json::to_vec_pretty(policy)?)?;
            }
            for (_, blob_id) in &staged.deleted {
                storage.delete_blob(blob_id)?;
            }
            Ok((
                staged.manifests.len(),
                staged.policies.len(),
                staged.deleted.len(),
            ))
        })
        .await;
        let (manifests, policies, deleted) = result?;
        debug!(manifests, policies, deleted, "write session flushed");
        Ok(())
    }
}
