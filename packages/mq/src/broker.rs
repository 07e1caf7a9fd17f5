use broccoli_queue::queue::BroccoliQueue;

use crate::error::MqError;

/// Live broker handle. Both binaries hold one behind an `Arc` and drive
/// `publish`/`process_messages` on it directly.
pub type Mq = BroccoliQueue;

/// Connection settings for the Redis-backed broker.
#[derive(Debug, Clone)]
pub struct MqConfig {
    /// `redis://` connection URL.
    pub url: String,
    /// Connections held in the pool.
    pub pool_size: u8,
}

/// Connect to the broker and build the shared queue handle.
pub async fn init_mq(config: MqConfig) -> Result<Mq, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}
