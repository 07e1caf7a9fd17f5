use thiserror::Error;

/// Failure while connecting to the broker.
#[derive(Debug, Error)]
#[error("MQ error: {0}")]
pub struct MqError(String);

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError(e.to_string())
    }
}
