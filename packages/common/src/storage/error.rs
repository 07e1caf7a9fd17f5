use thiserror::Error;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(String),
    /// An I/O error occurred.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The storage URI is malformed or escapes the store root.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
    /// The remote backend rejected or failed the request.
    #[error("storage backend error: {0}")]
    Backend(String),
}
