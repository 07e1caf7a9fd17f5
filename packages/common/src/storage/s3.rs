use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use serde::Deserialize;

use super::error::StorageError;
use super::traits::ObjectStore;

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Settings {
    pub bucket: String,
    /// Region name; ignored for custom endpoints beyond signing.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2).
    #[serde(default)]
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    /// Key prefix all objects are stored under.
    #[serde(default)]
    pub prefix: String,
    /// Base URL objects are publicly served from.
    pub public_url: String,
}

fn default_region() -> String {
    "us-east-1".into()
}

/// S3-backed object store.
pub struct S3Store {
    bucket: Box<Bucket>,
    prefix: String,
    public_url: String,
}

impl S3Store {
    pub fn new(settings: &S3Settings) -> Result<Self, StorageError> {
        let region = match &settings.endpoint {
            Some(endpoint) => Region::Custom {
                region: settings.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => settings
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            Some(&settings.access_key),
            Some(&settings.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let bucket =
            Bucket::new(&settings.bucket, region, credentials)
                .map_err(|e| StorageError::Backend(format!("bucket init failed: {e}")))?
                .with_path_style();

        Ok(Self {
            bucket,
            prefix: settings.prefix.trim_matches('/').to_string(),
            public_url: settings.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full object key for a store-relative URI.
    fn key(&self, uri: &str) -> String {
        let uri = uri.trim_start_matches('/');
        if self.prefix.is_empty() {
            uri.to_string()
        } else {
            format!("{}/{}", self.prefix, uri)
        }
    }

    /// Store-relative URI for a full object key.
    fn uri(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(&format!("{}/", self.prefix))
                .unwrap_or(key)
                .to_string()
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exist(&self, uri: &str) -> Result<bool, StorageError> {
        match self.bucket.get_object(self.key(uri)).await {
            Ok(_) => Ok(true),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn save(&self, uri: &str, data: &[u8]) -> Result<(), StorageError> {
        self.bucket
            .put_object(self.key(uri), data)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        match self.bucket.get_object(self.key(uri)).await {
            Ok(response) => Ok(response.to_vec()),
            Err(S3Error::HttpFailWithBody(404, _)) => Err(StorageError::NotFound(uri.to_string())),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn search(&self, file_name: &str, uri: Option<&str>) -> Result<Vec<String>, StorageError> {
        let list_prefix = match uri {
            Some(u) => self.key(u),
            None => self.prefix.clone(),
        };

        let results = self
            .bucket
            .list(list_prefix, None)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut found = Vec::new();
        for page in results {
            for object in page.contents {
                let matches = object
                    .key
                    .rsplit('/')
                    .next()
                    .is_some_and(|name| name == file_name);
                if matches {
                    found.push(self.uri(&object.key));
                }
            }
        }
        Ok(found)
    }

    fn get_url(&self, uri: &str) -> String {
        format!("{}/{}", self.public_url, self.key(uri)).replace(' ', "%20")
    }
}
