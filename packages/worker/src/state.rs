use std::path::PathBuf;
use std::sync::Arc;

use clients::{LlmClient, RagClient};
use common::storage::{LocalStore, ObjectStore};

use crate::config::WorkerAppConfig;

/// Clients and storage shared by every job handler.
pub struct WorkerState {
    pub llm: LlmClient,
    pub rag: RagClient,
    pub storage: Arc<dyn ObjectStore>,
    /// Embedding model for datasets this worker creates. `None` defers to
    /// the remote service's default.
    pub embedding_model: Option<String>,
}

impl WorkerState {
    pub async fn from_config(config: &WorkerAppConfig) -> anyhow::Result<Self> {
        let llm = LlmClient::new(
            &config.clients.llm.base_url,
            &config.clients.llm.api_key,
            &config.clients.llm.model,
        )?;
        let rag = RagClient::new(&config.clients.rag.base_url, &config.clients.rag.api_key)?;
        let storage = build_storage(config).await?;
        let embedding_model = config.clients.rag.embedding_model.trim();
        let embedding_model = (!embedding_model.is_empty()).then(|| embedding_model.to_string());

        Ok(Self {
            llm,
            rag,
            storage,
            embedding_model,
        })
    }
}

async fn build_storage(config: &WorkerAppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "local" => {
            let store = LocalStore::new(
                PathBuf::from(&config.storage.root),
                config.storage.url_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        "s3" => {
            let settings = config
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.s3 settings are required for the s3 backend"))?;
            let store = common::storage::S3Store::new(settings)?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown storage backend '{other}'"),
    }
}
