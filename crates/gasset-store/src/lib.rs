//! Backend capability set for gasset, and a directory-backed repository.
//!
//! The orchestration core never touches storage directly. Everything it
//! needs is expressed by the traits in [`traits`]:
//!
//! - [`Backend`] -- config loading, storage handles, repository creation,
//!   connection files
//! - [`Storage`] -- raw blob listing (the emptiness probe)
//! - [`Repository`] -- an open session, closed by its owner
//! - [`RepositoryWriter`] -- manifests, policies, upload and retention inside
//!   one write session
//!
//! # Filesystem backend
//!
//! [`FsBackend`] stores a repository in a local directory:
//!
//! ```text
//! <root>/gasset.repository          format header and password verifier
//! <root>/objects/xx/<hex>           file contents and directory trees
//! <root>/manifests/<source>/<id>.json
//! <root>/policies/<target>.json
//! ```
//!
//! Objects are content-addressed and written once. Manifests and policies
//! written inside a session become visible to other sessions on flush.

pub mod backend;
pub mod error;
pub mod format;
pub mod object;
pub mod repository;
pub mod retention;
pub mod storage;
pub mod traits;
pub mod upload;

pub use backend::{FsBackend, ConnectionFile, FILESYSTEM_STORAGE};
pub use error::{BackendError, BackendResult};
pub use format::RepositoryFormat;
pub use object::{ContentHasher, Tree, TreeEntry};
pub use repository::{FsRepository, FsWriter};
pub use retention::expired_manifests;
pub use storage::FsStorage;
pub use traits::{Backend, BlobMetadata, Repository, RepositoryWriter, Storage};
pub use upload::{Uploader, LIMIT_REACHED};

/// Run blocking filesystem work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> BackendResult<T>
where
    F: FnOnce() -> BackendResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(BackendError::Cancelled),
    }
}
