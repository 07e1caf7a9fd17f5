use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::error::StorageError;
use super::traits::ObjectStore;

/// Filesystem-backed object store.
///
/// Objects live under `root` at their URI path; URLs are built from
/// `url_prefix` (the route or reverse proxy serving `root`).
pub struct LocalStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStore {
    /// Create a new local store, creating `root` if needed.
    pub async fn new(root: PathBuf, url_prefix: String) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self { root, url_prefix })
    }

    /// Resolve a URI to an absolute path, rejecting traversal outside root.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(uri);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(StorageError::InvalidPath(uri.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.root
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    fn collect_matches(
        dir: &Path,
        root: &Path,
        file_name: &str,
        found: &mut Vec<String>,
    ) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() == ".tmp" {
                    continue;
                }
                Self::collect_matches(&path, root, file_name, found)?;
            } else if entry.file_name().to_string_lossy() == file_name {
                if let Ok(rel) = path.strip_prefix(root) {
                    found.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn exist(&self, uri: &str) -> Result<bool, StorageError> {
        let path = self.resolve(uri)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn save(&self, uri: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(uri)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp file first so a crash never leaves a truncated
        // object at its final path.
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(uri)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn search(&self, file_name: &str, uri: Option<&str>) -> Result<Vec<String>, StorageError> {
        let base = match uri {
            Some(u) => self.resolve(u)?,
            None => self.root.clone(),
        };
        if !fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        let file_name = file_name.to_string();
        let found = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            Self::collect_matches(&base, &root, &file_name, &mut found)?;
            Ok::<_, std::io::Error>(found)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("search task failed: {e}")))??;

        Ok(found)
    }

    fn get_url(&self, uri: &str) -> String {
        format!(
            "{}/{}",
            self.url_prefix.trim_end_matches('/'),
            uri.replace(' ', "%20")
        )
    }
}
