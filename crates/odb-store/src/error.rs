use std::path::PathBuf;

use odb_types::{PartialDigest, TypeError};

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No examined location holds the requested object.
    #[error("object not found: {0}")]
    NotFound(String),

    /// An abbreviated digest matches more than one object.
    #[error("ambiguous object name: {0}")]
    Ambiguous(PartialDigest),

    /// The operation is not supported by this database.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Another writer already holds the lock file.
    #[error("lock at {} could not be obtained", .0.display())]
    LockUnavailable(PathBuf),

    /// An API was driven out of protocol, e.g. a double open.
    #[error("usage error: {0}")]
    Usage(String),

    /// A lazily resolved attribute was not produced by its resolver.
    #[error("attribute {0} was not populated by its resolver")]
    AttributeMissing(&'static str),

    /// Stored data is malformed or fails an integrity check.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Malformed digest or prefix.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// I/O error from the filesystem or a mapping.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
