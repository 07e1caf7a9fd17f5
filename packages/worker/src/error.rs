use thiserror::Error;

/// Worker error type.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("MQ error: {0}")]
    Mq(String),

    #[error("Client error: {0}")]
    Client(#[from] clients::ClientError),

    #[error("Storage error: {0}")]
    Storage(#[from] common::storage::StorageError),

    #[error("Job error: {0}")]
    Job(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
