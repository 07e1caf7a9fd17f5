use serde::{Deserialize, Serialize};

use crate::retry::RetryAttempt;

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// The delivery retry budget ran out.
    MaxRetriesExceeded,
    /// The payload would not decode.
    DeserializationError,
    /// Content sat in an in-flight status past the stale cutoff.
    StuckContent,
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
            Self::StuckContent => "STUCK_CONTENT",
        };
        f.write_str(code)
    }
}

/// Which kind of traffic a dead letter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqMessageType {
    /// Failed enrichment job (server -> worker message).
    EnrichJob,
    /// Failed index job (server -> worker message).
    IndexJob,
    /// Failed job result (worker -> server message).
    JobResult,
    /// Content whose extraction never reached a terminal status.
    Extraction,
}

impl std::fmt::Display for DlqMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::EnrichJob => "enrich_job",
            Self::IndexJob => "index_job",
            Self::JobResult => "job_result",
            Self::Extraction => "extraction",
        };
        f.write_str(kind)
    }
}

/// What gets published to the dead letter queue when delivery gives up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Queue message ID the failure was tracked under.
    pub message_id: String,
    /// Traffic kind that failed.
    pub message_type: DlqMessageType,
    /// Associated content ID.
    ///
    /// `None` when the content ID cannot be determined
    /// (e.g., deserialization failed before extracting content_id).
    pub content_id: Option<i32>,
    /// Full serialized message payload.
    pub payload: serde_json::Value,
    /// Machine-readable error code.
    pub error_code: DlqErrorCode,
    /// Human-readable error message.
    pub error_message: String,
    /// History of retry attempts before reaching DLQ.
    pub retry_history: Vec<RetryAttempt>,
}
