use async_trait::async_trait;

use super::error::StorageError;

/// Named object storage for uploaded files.
///
/// URIs are relative, slash-separated paths (e.g. `uploads/abc.mp3`).
/// Implementations decide where the bytes live and what public URL they
/// resolve to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists.
    async fn exist(&self, uri: &str) -> Result<bool, StorageError>;

    /// Store bytes under the given URI, creating parent directories or key
    /// prefixes as needed. Overwrites an existing object.
    async fn save(&self, uri: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Retrieve all bytes of an object.
    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError>;

    /// Find stored URIs whose file name matches `file_name`, optionally
    /// restricted to the subtree under `uri`.
    async fn search(&self, file_name: &str, uri: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// Public URL an object is served from. Spaces are percent-escaped;
    /// the object is not required to exist.
    fn get_url(&self, uri: &str) -> String;
}
