use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::MediaType;

/// A language-model enrichment job sent to the worker queue.
///
/// Carries everything the worker needs; the worker never reads the
/// database. `generation` is the content row's attempt generation at
/// enqueue time, echoed back in the result so stale work can be dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichJob {
    /// Job identifier (UUID).
    pub job_id: String,
    /// Content row this job derives from.
    pub content_id: i32,
    /// Attempt generation the job was enqueued under.
    pub generation: i32,
    /// Media type of the content (drives prompt wording).
    pub media_type: MediaType,
    /// Derived text to enrich: timestamped subtitles for timeline media,
    /// plain extracted text otherwise. Never empty; empty sources are not
    /// enqueued.
    pub source_text: String,
}

impl EnrichJob {
    pub fn new(content_id: i32, generation: i32, media_type: MediaType, source_text: String) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            content_id,
            generation,
            media_type,
            source_text,
        }
    }
}

/// A retrieval-index job sent to the worker queue.
///
/// Exactly one of `text` / `storage_file` is set: inline text for media
/// whose upload body is derived text, a storage URI for media uploaded as
/// the raw file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexJob {
    /// Job identifier (UUID).
    pub job_id: String,
    /// Content row this job derives from.
    pub content_id: i32,
    /// Attempt generation the job was enqueued under.
    pub generation: i32,
    /// Public uid of the content; part of the remote dataset name.
    pub content_uid: String,
    /// Media type of the content (drives the upload body and extension).
    pub media_type: MediaType,
    /// Content title, used for the remote document display name.
    pub title: String,
    /// Inline UTF-8 upload body.
    pub text: Option<String>,
    /// Storage URI of the raw file to upload.
    pub storage_file: Option<String>,
}

impl IndexJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content_id: i32,
        generation: i32,
        content_uid: String,
        media_type: MediaType,
        title: String,
        text: Option<String>,
        storage_file: Option<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            content_id,
            generation,
            content_uid,
            media_type,
            title,
            text,
            storage_file,
        }
    }

    /// Remote dataset name for this content.
    pub fn dataset_name(&self) -> String {
        format!("post_{}_{}", self.media_type, self.content_uid)
    }
}

/// Fields produced by the enrichment job.
///
/// `summary` is mandatory (its failure fails the whole job); the remaining
/// fields are each best-effort and may be absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichmentOutput {
    pub summary: String,
    pub structure: Option<String>,
    pub mermaid: Option<String>,
    pub recommend_reason: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Terminal outcome of an index job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Completed,
    PartiallyCompleted,
    Failed,
}

/// Result published by the worker after processing a job.
///
/// The server-side consumer applies it only when `generation` still matches
/// the content row.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    /// Enrichment finished; carries the derived fields to persist.
    Enriched {
        job_id: String,
        content_id: i32,
        generation: i32,
        output: EnrichmentOutput,
    },
    /// Index upload began; carries the remote dataset linkage.
    IndexStarted {
        job_id: String,
        content_id: i32,
        generation: i32,
        dataset_id: String,
        dataset_doc_id: String,
    },
    /// Index job reached a terminal state.
    Indexed {
        job_id: String,
        content_id: i32,
        generation: i32,
        outcome: IndexOutcome,
        error_message: Option<String>,
    },
}

impl JobResult {
    pub fn content_id(&self) -> i32 {
        match self {
            Self::Enriched { content_id, .. }
            | Self::IndexStarted { content_id, .. }
            | Self::Indexed { content_id, .. } => *content_id,
        }
    }

    pub fn generation(&self) -> i32 {
        match self {
            Self::Enriched { generation, .. }
            | Self::IndexStarted { generation, .. }
            | Self::Indexed { generation, .. } => *generation,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::Enriched { job_id, .. }
            | Self::IndexStarted { job_id, .. }
            | Self::Indexed { job_id, .. } => job_id,
        }
    }
}
