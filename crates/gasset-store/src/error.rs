use std::path::PathBuf;

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The requested blob or record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record that must be written once already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The repository password does not match the one it was created with.
    #[error("invalid repository password")]
    InvalidPassword,

    /// No connection file exists for this repository on this machine.
    #[error("not connected: no connection file at {}", .0.display())]
    NotConnected(PathBuf),

    /// Stored data could not be decoded.
    #[error("corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    /// The storage `type` named in the backend config is not provided.
    #[error("unsupported storage type: {0}")]
    UnsupportedStorage(String),

    /// The backend config is missing a field or has a bad value.
    #[error("invalid backend config: {0}")]
    InvalidConfig(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
