use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: true.
    /// Note: Worker ignores this field (always requires MQ).
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue for enrichment jobs (server publishes, worker consumes).
    /// Default: "enrich_jobs".
    #[serde(default = "default_enrich_queue_name")]
    pub enrich_queue_name: String,
    /// Queue for index jobs (server publishes, worker consumes).
    /// Default: "index_jobs".
    #[serde(default = "default_index_queue_name")]
    pub index_queue_name: String,
    /// Queue for job results (worker publishes, server consumes).
    /// Default: "job_results".
    #[serde(default = "default_result_queue_name")]
    pub result_queue_name: String,
    /// Queue for dead-lettered messages (worker publishes, server consumes).
    /// Default: "job_dlq".
    #[serde(default = "default_dlq_queue_name")]
    pub dlq_queue_name: String,
    /// Retry/DLQ tuning.
    #[serde(default)]
    pub dlq: DlqConfig,
}

/// Retry and dead-letter tuning shared by both sides of the queue.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// Attempts before a message is dead-lettered. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Base backoff delay in milliseconds. Default: 1000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff delay cap in milliseconds. Default: 60000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How often stale retry-tracker entries are swept, in seconds.
    /// Default: 300.
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    /// Age after which an untouched retry-tracker entry is dropped, in
    /// seconds. Default: 3600.
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_enrich_queue_name() -> String {
    "enrich_jobs".into()
}
fn default_index_queue_name() -> String {
    "index_jobs".into()
}
fn default_result_queue_name() -> String {
    "job_results".into()
}
fn default_dlq_queue_name() -> String {
    "job_dlq".into()
}
fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60000
}
fn default_retry_cleanup_interval_secs() -> u64 {
    300
}
fn default_retry_max_age_secs() -> u64 {
    3600
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            enrich_queue_name: default_enrich_queue_name(),
            index_queue_name: default_index_queue_name(),
            result_queue_name: default_result_queue_name(),
            dlq_queue_name: default_dlq_queue_name(),
            dlq: DlqConfig::default(),
        }
    }
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
        }
    }
}
