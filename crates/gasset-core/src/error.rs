use std::path::PathBuf;

use gasset_store::BackendError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum GassetError {
    #[error("not a git repository (or any of the parent directories): {}", .start.display())]
    NotAGitRepository { start: PathBuf },

    #[error("cannot read project config {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse project config {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("cannot write project config {}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load secrets from {}: {reason}", .path.display())]
    SecretsLoad {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<dotenvy::Error>,
    },

    #[error("storage {location} already holds data; refusing to create a repository there")]
    AlreadyInitialized { location: String },

    #[error("project has no repository identity; run `gasset init --create` to create one")]
    IdentityMissing,

    #[error("cannot connect to backend ({context})")]
    BackendConnect {
        context: String,
        #[source]
        source: BackendError,
    },

    #[error("cannot initialize backend repository")]
    BackendInit(#[source] BackendError),

    #[error("policy operation failed for {target}")]
    Policy {
        target: String,
        #[source]
        source: BackendError,
    },

    #[error("cannot list snapshots of {}", .path.display())]
    ManifestList {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("upload of {} failed", .path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("cannot save snapshot of {}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("cannot apply retention for {}", .path.display())]
    Retention {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

impl GassetError {
    pub(crate) fn connect(context: impl Into<String>) -> impl FnOnce(BackendError) -> Self {
        let context = context.into();
        move |source| Self::BackendConnect { context, source }
    }

    /// The backend error underneath, if this error came from the backend.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::BackendConnect { source, .. }
            | Self::Policy { source, .. }
            | Self::ManifestList { source, .. }
            | Self::Upload { source, .. }
            | Self::Save { source, .. }
            | Self::Retention { source, .. }
            | Self::BackendInit(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.backend_error(), Some(BackendError::Cancelled))
    }
}

pub type GassetResult<T> = Result<T, GassetError>;
