use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Public base URL of the content page, used to build share links.
    pub content_page_url: String,
    /// Public base URL knowledge base share links are built from.
    pub kb_share_page_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// "local" or "s3".
    pub backend: String,
    /// Root directory for the local backend.
    pub root: String,
    /// Public URL prefix objects are served from.
    pub url_prefix: String,
    /// Bucket settings, required when `backend` is "s3".
    #[cfg(feature = "object-storage")]
    #[serde(default)]
    pub s3: Option<common::storage::S3Settings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Upper bound for a single uploaded file, in bytes.
    pub max_upload_bytes: usize,
    /// Longest accepted single audio file, in seconds.
    pub single_audio_max_seconds: f64,
    /// Per-user transcription budget across all audio, in seconds.
    pub total_audio_max_seconds: f64,
    /// Most placeholders accepted by one batch create call.
    pub batch_max_items: usize,
    /// Subtitle blocks shorter than this are merged, in seconds.
    pub subtitle_merge_seconds: f64,
    /// How often the stale-content sweeper runs, in seconds.
    pub stale_sweep_interval_secs: u64,
    /// Age after which an in-flight row counts as stuck, in seconds.
    pub stale_after_secs: i64,
    /// Most rows handled per sweep.
    pub stale_sweep_limit: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadabilityConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyedClientConfig {
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientsConfig {
    pub readability: ReadabilityConfig,
    pub youtube: KeyedClientConfig,
    pub transcripts: KeyedClientConfig,
    pub spotify: KeyedClientConfig,
    pub twitter: KeyedClientConfig,
    pub asr: KeyedClientConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub ingest: IngestConfig,
    pub clients: ClientsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", vec!["*".to_string()])?
            .set_default("server.cors.max_age", 3600)?
            .set_default("server.content_page_url", "http://localhost:3000/content")?
            .set_default("server.kb_share_page_url", "http://localhost:3000")?
            .set_default("database.url", "postgres://localhost/magpie")?
            .set_default("storage.backend", "local")?
            .set_default("storage.root", "./storage")?
            .set_default("storage.url_prefix", "http://localhost:3000/api/v1/files")?
            .set_default("ingest.max_upload_bytes", 100 * 1024 * 1024)?
            .set_default("ingest.single_audio_max_seconds", 7200.0)?
            .set_default("ingest.total_audio_max_seconds", 28800.0)?
            .set_default("ingest.batch_max_items", 50)?
            .set_default("ingest.subtitle_merge_seconds", 30.0)?
            .set_default("ingest.stale_sweep_interval_secs", 60)?
            .set_default("ingest.stale_after_secs", 600)?
            .set_default("ingest.stale_sweep_limit", 500)?
            .set_default("clients.readability.base_url", "http://localhost:3010")?
            .set_default("clients.youtube.api_key", "")?
            .set_default("clients.transcripts.api_key", "")?
            .set_default("clients.spotify.api_key", "")?
            .set_default("clients.twitter.api_key", "")?
            .set_default("clients.asr.api_key", "")?
            .set_default("clients.llm.base_url", "https://api.openai.com/v1")?
            .set_default("clients.llm.api_key", "")?
            .set_default("clients.llm.model", "gpt-4o-mini")?
            .set_default("clients.rag.base_url", "http://localhost:9380")?
            .set_default("clients.rag.api_key", "")?
            .set_default("clients.rag.embedding_model", "")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., MAGPIE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("MAGPIE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
