use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid project id {value:?}: {reason}")]
    InvalidProjectId { value: String, reason: String },

    #[error("invalid manifest id: {0}")]
    InvalidManifestId(String),
}
