//! Request and wire types for the RAG chat surface.
//!
//! Answers stream back as `application/x-ndjson`: one [`ChatFrame`] per
//! line, every frame carrying the same field set so clients can parse
//! lines uniformly regardless of status.

use clients::rag::ReferenceChunk;
use common::MediaType;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entity::{ChatStartType, content};
use crate::error::AppError;

/// Body for `POST /chat`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
    /// Client-generated id echoed back on every frame of this answer.
    pub msg_id: String,
    pub chat_start_type: ChatStartType,
    /// Required when `chat_start_type` is `article`.
    pub content_uid: Option<String>,
    /// Required when `chat_start_type` is `single_knowledge_base`.
    pub kb_uid: Option<String>,
    #[serde(default)]
    pub use_web_search: bool,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.question.trim().is_empty() {
            return Err(AppError::Validation("question must not be empty".into()));
        }
        if self.msg_id.trim().is_empty() {
            return Err(AppError::Validation("msg_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Query for `GET /chat/status`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailabilityQuery {
    pub chat_start_type: ChatStartType,
    pub content_uid: Option<String>,
    pub kb_uid: Option<String>,
}

/// Lifecycle marker carried on every streamed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Processing,
    FollowupPreparing,
    Completed,
    Error,
}

/// One line of the NDJSON answer stream.
///
/// All fields are always present on the wire; absent values serialize
/// as `null` (or `[]` for `followup_question`).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatFrame {
    pub msg_id: String,
    pub content: Option<String>,
    pub reference: Option<Vec<EnrichedReference>>,
    pub status: CompletionStatus,
    pub error_message: Option<String>,
    pub followup_question: Vec<String>,
}

impl ChatFrame {
    fn new(msg_id: &str, status: CompletionStatus) -> Self {
        Self {
            msg_id: msg_id.to_owned(),
            content: None,
            reference: None,
            status,
            error_message: None,
            followup_question: Vec::new(),
        }
    }

    pub fn processing(msg_id: &str, content: impl Into<String>) -> Self {
        let mut frame = Self::new(msg_id, CompletionStatus::Processing);
        frame.content = Some(content.into());
        frame
    }

    /// Emitted once the answer is complete but followup questions and
    /// reference enrichment are still being prepared.
    pub fn followup_preparing(msg_id: &str, content: impl Into<String>) -> Self {
        let mut frame = Self::new(msg_id, CompletionStatus::FollowupPreparing);
        frame.content = Some(content.into());
        frame
    }

    pub fn completed(
        msg_id: &str,
        content: impl Into<String>,
        reference: Option<Vec<EnrichedReference>>,
        followup_question: Vec<String>,
    ) -> Self {
        let mut frame = Self::new(msg_id, CompletionStatus::Completed);
        frame.content = Some(content.into());
        frame.reference = reference;
        frame.followup_question = followup_question;
        frame
    }

    pub fn error(msg_id: &str, message: impl Into<String>) -> Self {
        let mut frame = Self::new(msg_id, CompletionStatus::Error);
        frame.error_message = Some(message.into());
        frame
    }

    /// Serializes the frame as one newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"status":"error"}"#.to_owned());
        line.push('\n');
        line
    }
}

/// Reference entry attached to the final frame of a stream.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnrichedReference {
    pub id: Option<String>,
    pub image_id: Option<String>,
    pub content: Option<String>,
    pub content_raw: ReferenceSource,
}

/// Provenance of a reference chunk.
///
/// `internal` sources point at one of our own contents and carry a
/// detail page URL; `external` sources come from web search and only
/// carry the original link.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReferenceSource {
    pub source_type: String,
    pub source: Option<String>,
    pub uid: Option<String>,
    pub title: Option<String>,
    pub media_type: Option<MediaType>,
    pub page_url: Option<String>,
}

impl EnrichedReference {
    pub fn internal(
        chunk: &ReferenceChunk,
        content: &content::Model,
        content_page_url: &str,
    ) -> Self {
        Self {
            id: chunk.id.clone(),
            image_id: chunk.image_id.clone(),
            content: chunk.content.clone(),
            content_raw: ReferenceSource {
                source_type: "internal".to_owned(),
                source: content.source.clone(),
                uid: Some(content.uid.clone()),
                title: content.title.clone(),
                media_type: Some(content.media_type),
                page_url: Some(format!("{content_page_url}/{}", content.uid)),
            },
        }
    }

    pub fn external(chunk: &ReferenceChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            image_id: chunk.image_id.clone(),
            content: chunk.content.clone(),
            content_raw: ReferenceSource {
                source_type: "external".to_owned(),
                source: chunk.url.clone(),
                uid: None,
                title: chunk.document_name.clone(),
                media_type: Some(MediaType::Article),
                page_url: None,
            },
        }
    }
}

/// Readiness of the datasets backing a chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    PartiallyAvailable,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatAvailabilityResponse {
    pub status: AvailabilityStatus,
    pub message: String,
}
