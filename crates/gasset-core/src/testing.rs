//! In-memory recording backend for unit tests.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use gasset_store::{
    Backend, BackendError, BackendResult, BlobMetadata, Repository, RepositoryWriter, Storage,
};
use gasset_types::{
    BackendConfig, ClientOptions, ManifestId, ObjectId, Policy, PolicyTarget, PolicyTree,
    SnapshotManifest, SourceInfo,
};

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    fail: HashSet<String>,
    cancel: HashSet<String>,
    has_data: bool,
    manifests: Vec<SnapshotManifest>,
    saved: Vec<SnapshotManifest>,
    policies: Vec<(PolicyTarget, Policy)>,
    connections: Vec<PathBuf>,
    upload_previous: Vec<usize>,
    closed: usize,
}

/// Backend double. Every call is recorded by name; an operation named in
/// [`FakeBackend::failing`] returns an I/O error instead of running.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn initialized() -> Self {
        let backend = Self::default();
        backend.lock().has_data = true;
        backend
    }

    /// Fail `op`. Uploads can also be failed for one path with
    /// `upload:<path>`.
    pub fn failing(self, op: &str) -> Self {
        self.lock().fail.insert(op.to_string());
        self
    }

    /// Make `op` report [`BackendError::Cancelled`].
    pub fn cancelling(self, op: &str) -> Self {
        self.lock().cancel.insert(op.to_string());
        self
    }

    pub fn add_manifest(&self, manifest: SnapshotManifest) {
        self.lock().manifests.push(manifest);
    }

    pub async fn open_for_tests(&self) -> FakeRepository {
        FakeRepository {
            state: self.state.clone(),
            options: ClientOptions::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn saved(&self) -> Vec<SnapshotManifest> {
        self.lock().saved.clone()
    }

    pub fn policies(&self) -> Vec<(PolicyTarget, Policy)> {
        self.lock().policies.clone()
    }

    pub fn connections(&self) -> Vec<PathBuf> {
        self.lock().connections.clone()
    }

    pub fn upload_previous_counts(&self) -> Vec<usize> {
        self.lock().upload_previous.clone()
    }

    pub fn closed_count(&self) -> usize {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap()
}

fn record(state: &Mutex<State>, op: &str) -> BackendResult<()> {
    let mut state = lock(state);
    state.calls.push(op.to_string());
    if state.fail.contains(op) {
        return Err(BackendError::Io(io::Error::other(format!("injected {op} failure"))));
    }
    if state.cancel.contains(op) {
        return Err(BackendError::Cancelled);
    }
    Ok(())
}

pub(crate) struct FakeStorage {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Storage for FakeStorage {
    async fn list_blobs(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> BackendResult<Vec<BlobMetadata>> {
        record(&self.state, "list_blobs")?;
        let has_data = lock(&self.state).has_data;
        let blobs = has_data.then(|| BlobMetadata {
            id: format!("{prefix}gasset.repository"),
            length: 1,
            timestamp: Utc::now(),
        });
        Ok(blobs.into_iter().take(limit.unwrap_or(usize::MAX)).collect())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    type Storage = FakeStorage;
    type Repository = FakeRepository;

    async fn load_config(&self, path: &Path) -> BackendResult<BackendConfig> {
        record(&self.state, "load_config")?;
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn new_storage(&self, _config: &BackendConfig) -> BackendResult<FakeStorage> {
        record(&self.state, "new_storage")?;
        Ok(FakeStorage {
            state: self.state.clone(),
        })
    }

    async fn initialize(&self, _storage: &FakeStorage, _password: &str) -> BackendResult<()> {
        record(&self.state, "initialize")?;
        self.lock().has_data = true;
        Ok(())
    }

    async fn connect(
        &self,
        connection_path: &Path,
        _storage: &FakeStorage,
        _password: &str,
        _client_options: &ClientOptions,
    ) -> BackendResult<()> {
        record(&self.state, "connect")?;
        self.lock().connections.push(connection_path.to_path_buf());
        Ok(())
    }

    async fn open(&self, _connection_path: &Path, _password: &str) -> BackendResult<FakeRepository> {
        record(&self.state, "open")?;
        Ok(self.open_for_tests().await)
    }
}

#[derive(Debug)]
pub(crate) struct FakeRepository {
    state: Arc<Mutex<State>>,
    options: ClientOptions,
}

#[async_trait]
impl Repository for FakeRepository {
    type Writer = FakeWriter;

    fn client_options(&self) -> &ClientOptions {
        &self.options
    }

    async fn new_writer(&self, _purpose: &str) -> BackendResult<FakeWriter> {
        record(&self.state, "new_writer")?;
        Ok(FakeWriter {
            state: self.state.clone(),
        })
    }

    async fn close(&self) -> BackendResult<()> {
        lock(&self.state).closed += 1;
        record(&self.state, "close")
    }
}

pub(crate) struct FakeWriter {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl RepositoryWriter for FakeWriter {
    async fn list_snapshots(&self, source: &SourceInfo) -> BackendResult<Vec<SnapshotManifest>> {
        record(&self.state, "list_snapshots")?;
        let state = lock(&self.state);
        Ok(state
            .manifests
            .iter()
            .filter(|m| &m.source == source)
            .cloned()
            .collect())
    }

    async fn policy_tree(&self, _source: &SourceInfo) -> BackendResult<PolicyTree> {
        record(&self.state, "policy_tree")?;
        Ok(PolicyTree::build(None, None))
    }

    async fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> BackendResult<()> {
        record(&self.state, "set_policy")?;
        lock(&self.state)
            .policies
            .push((target.clone(), policy.clone()));
        Ok(())
    }

    async fn upload(
        &self,
        path: &Path,
        _policy: &PolicyTree,
        source: &SourceInfo,
        previous: &[SnapshotManifest],
    ) -> BackendResult<SnapshotManifest> {
        record(&self.state, "upload")?;
        let path_op = format!("upload:{}", path.display());
        {
            let mut state = lock(&self.state);
            if state.fail.contains(&path_op) {
                return Err(BackendError::Io(io::Error::other("injected upload failure")));
            }
            state.upload_previous.push(previous.len());
        }
        Ok(SnapshotManifest::new(
            source.clone(),
            Utc::now(),
            ObjectId::from_bytes(path.to_string_lossy().as_bytes()),
        ))
    }

    async fn save_snapshot(&self, manifest: &SnapshotManifest) -> BackendResult<ManifestId> {
        record(&self.state, "save_snapshot")?;
        lock(&self.state).saved.push(manifest.clone());
        Ok(manifest.id)
    }

    async fn apply_retention(&self, _source: &SourceInfo) -> BackendResult<Vec<ManifestId>> {
        record(&self.state, "apply_retention")?;
        Ok(Vec::new())
    }

    async fn flush(&self) -> BackendResult<()> {
        record(&self.state, "flush")
    }
}
