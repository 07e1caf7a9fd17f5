use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Unique identifier for this worker instance.
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Number of jobs processed concurrently per queue.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_worker_id() -> String {
    "worker-1".to_string()
}

fn default_batch_size() -> usize {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            batch_size: default_batch_size(),
        }
    }
}

/// Object storage holding uploaded files. The keys mirror the server's
/// `storage` section so one config file can serve both binaries.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Storage backend: "local" or "s3".
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Root directory for the local backend.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Public URL prefix files are served under.
    #[serde(default = "default_storage_url_prefix")]
    pub url_prefix: String,
    /// Bucket settings, required when `backend` is "s3".
    #[cfg(feature = "object-storage")]
    #[serde(default)]
    pub s3: Option<common::storage::S3Settings>,
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./storage".to_string()
}

fn default_storage_url_prefix() -> String {
    "http://localhost:3000/api/v1/files".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            url_prefix: default_storage_url_prefix(),
            #[cfg(feature = "object-storage")]
            s3: None,
        }
    }
}

/// LLM endpoint used for enrichment completions.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

/// RAG service hosting the per-content datasets.
#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_rag_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Embedding model for datasets this worker creates. Empty string
    /// defers to the remote service's default.
    #[serde(default)]
    pub embedding_model: String,
}

fn default_rag_base_url() -> String {
    "http://localhost:9380".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            base_url: default_rag_base_url(),
            api_key: String::new(),
            embedding_model: String::new(),
        }
    }
}

/// Upstream services the worker talks to.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerClientsConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clients: WorkerClientsConfig,
}

impl WorkerAppConfig {
    /// Load configuration from file and environment.
    ///
    /// The config file path defaults to `config/config.{toml,yaml,...}` and
    /// can be overridden with the `MAGPIE_CONFIG` environment variable.
    /// Environment variables use the `MAGPIE` prefix with `__` separators,
    /// e.g. `MAGPIE__MQ__URL`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("MAGPIE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("worker.id", "worker-1")?
            .set_default("worker.batch_size", 10_i64)?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.pool_size", 5_i64)?
            .set_default("mq.enrich_queue_name", "enrich_jobs")?
            .set_default("mq.index_queue_name", "index_jobs")?
            .set_default("mq.result_queue_name", "job_results")?
            .set_default("mq.dlq_queue_name", "job_dlq")?
            .set_default("storage.backend", "local")?
            .set_default("storage.root", "./storage")?
            .set_default("storage.url_prefix", "http://localhost:3000/api/v1/files")?
            .set_default("clients.llm.base_url", "https://api.openai.com/v1")?
            .set_default("clients.llm.api_key", "")?
            .set_default("clients.llm.model", "gpt-4o-mini")?
            .set_default("clients.rag.base_url", "http://localhost:9380")?
            .set_default("clients.rag.api_key", "")?
            .set_default("clients.rag.embedding_model", "")?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("MAGPIE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
