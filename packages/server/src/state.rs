use std::sync::Arc;

use clients::{
    AsrClient, ClientError, LlmClient, RagClient, ReadabilityClient, SpotifyClient,
    TranscriptClient, TwitterClient, YouTubeClient,
};
use common::storage::ObjectStore;
use sea_orm::DatabaseConnection;

use crate::config::{AppConfig, ClientsConfig};

/// All outbound service clients, constructed once at startup.
pub struct ClientSet {
    pub readability: ReadabilityClient,
    pub youtube: YouTubeClient,
    pub transcripts: TranscriptClient,
    pub spotify: SpotifyClient,
    pub twitter: TwitterClient,
    pub asr: AsrClient,
    pub llm: LlmClient,
    pub rag: RagClient,
}

impl ClientSet {
    pub fn from_config(config: &ClientsConfig) -> Result<Self, ClientError> {
        Ok(Self {
            readability: ReadabilityClient::new(&config.readability.base_url)?,
            youtube: YouTubeClient::new(&config.youtube.api_key)?,
            transcripts: TranscriptClient::new(&config.transcripts.api_key)?,
            spotify: SpotifyClient::new(&config.spotify.api_key)?,
            twitter: TwitterClient::new(&config.twitter.api_key)?,
            asr: AsrClient::new(&config.asr.api_key)?,
            llm: LlmClient::new(&config.llm.base_url, &config.llm.api_key, &config.llm.model)?,
            rag: RagClient::new(&config.rag.base_url, &config.rag.api_key)?,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    /// `None` when MQ is disabled; enqueue sites log and skip.
    pub mq: Option<Arc<mq::Mq>>,
    pub storage: Arc<dyn ObjectStore>,
    pub clients: Arc<ClientSet>,
}
