//! Error types for Montage.

use thiserror::Error;

/// Main error type for Montage operations.
///
/// Editing preconditions fail with a typed variant at the point of the
/// violation and are never retried internally. A failed call leaves the
/// composition state exactly as it was before the call.
#[derive(Error, Debug)]
pub enum MontageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate link: {0}")]
    DuplicateLink(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Montage operations.
pub type Result<T> = std::result::Result<T, MontageError>;
