//! Foundation types for gasset.
//!
//! This crate provides the value types shared by the backend capability set
//! (`gasset-store`) and the orchestration core (`gasset-core`). Every other
//! gasset crate depends on `gasset-types`.
//!
//! # Key Types
//!
//! - [`ProjectId`] -- Durable per-project identity, generated once at create time
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`SourceInfo`] -- `(host, user, path)` key of a snapshot history
//! - [`SnapshotManifest`] -- Immutable record of one snapshot attempt
//! - [`Policy`] / [`PolicyTree`] -- Snapshot policy and its effective merge
//! - [`BackendConfig`] -- Backend connection settings persisted in the project file

pub mod backend_config;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod object;
pub mod policy;
pub mod source;

pub use backend_config::{AccessKeys, BackendConfig, ClientOptions, StorageConfig};
pub use error::TypeError;
pub use identity::{ProjectId, PROJECT_ID_LENGTH};
pub use manifest::{DirectorySummary, EntryKind, ManifestId, RootEntry, SnapshotManifest};
pub use object::ObjectId;
pub use policy::{
    CompressionPolicy, Compressor, ErrorHandlingPolicy, FilesPolicy, LogDetail, LoggingPolicy, Policy,
    PolicyTarget, PolicyTree, RetentionPolicy, SchedulingPolicy, UploadPolicy,
};
pub use source::SourceInfo;
