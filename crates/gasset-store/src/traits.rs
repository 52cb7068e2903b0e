use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gasset_types::{
    BackendConfig, ClientOptions, ManifestId, Policy, PolicyTarget, PolicyTree, SnapshotManifest,
    SourceInfo,
};

use crate::error::BackendResult;

/// Listing entry returned by [`Storage::list_blobs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Storage-relative name, `/`-separated.
    pub id: String,
    pub length: u64,
    pub timestamp: DateTime<Utc>,
}

/// Raw blob storage underneath a repository.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List blobs whose name starts with `prefix`, stopping after `limit`
    /// entries when given.
    async fn list_blobs(&self, prefix: &str, limit: Option<usize>)
        -> BackendResult<Vec<BlobMetadata>>;
}

/// The storage/versioning engine the orchestration core drives.
///
/// Every capability the core needs is reached through this trait, so a test
/// double can stand in for the real engine without global state.
#[async_trait]
pub trait Backend: Send + Sync {
    type Storage: Storage;
    type Repository: Repository;

    /// Parse a backend config file, filling any defaults the file omits.
    async fn load_config(&self, path: &Path) -> BackendResult<BackendConfig>;

    /// Build a storage handle from a (normalized) backend config.
    async fn new_storage(&self, config: &BackendConfig) -> BackendResult<Self::Storage>;

    /// Create a new repository in `storage`, protected by `password`.
    async fn initialize(&self, storage: &Self::Storage, password: &str) -> BackendResult<()>;

    /// Record a connection to the repository in `storage` at
    /// `connection_path`. Connecting again with the same inputs rewrites the
    /// same file.
    async fn connect(
        &self,
        connection_path: &Path,
        storage: &Self::Storage,
        password: &str,
        client_options: &ClientOptions,
    ) -> BackendResult<()>;

    /// Open the repository recorded at `connection_path`.
    async fn open(&self, connection_path: &Path, password: &str)
        -> BackendResult<Self::Repository>;
}

/// An open repository session. Must be closed by its owner.
#[async_trait]
pub trait Repository: Send + Sync {
    type Writer: RepositoryWriter;

    fn client_options(&self) -> &ClientOptions;

    /// Start a write session. Writes become durable on
    /// [`RepositoryWriter::flush`].
    async fn new_writer(&self, purpose: &str) -> BackendResult<Self::Writer>;

    async fn close(&self) -> BackendResult<()>;
}

/// Snapshot and policy operations inside a write session.
#[async_trait]
pub trait RepositoryWriter: Send + Sync {
    /// All manifests recorded for `source`, in no particular order.
    async fn list_snapshots(&self, source: &SourceInfo) -> BackendResult<Vec<SnapshotManifest>>;

    async fn policy_tree(&self, source: &SourceInfo) -> BackendResult<PolicyTree>;

    async fn set_policy(&self, target: &PolicyTarget, policy: &Policy) -> BackendResult<()>;

    /// Upload the tree at `path`, using `previous` as the diff base.
    async fn upload(
        &self,
        path: &Path,
        policy: &PolicyTree,
        source: &SourceInfo,
        previous: &[SnapshotManifest],
    ) -> BackendResult<SnapshotManifest>;

    async fn save_snapshot(&self, manifest: &SnapshotManifest) -> BackendResult<ManifestId>;

    /// Expire manifests of `source` according to its effective retention
    /// policy. Returns the expired ids.
    async fn apply_retention(&self, source: &SourceInfo) -> BackendResult<Vec<ManifestId>>;

    async fn flush(&self) -> BackendResult<()>;
}
