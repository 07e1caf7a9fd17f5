use std::time::{Duration, Instant};

use clients::RagClient;
use clients::rag::DocRunStatus;
use common::MediaType;
use common::jobs::{IndexJob, IndexOutcome};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::state::WorkerState;

const DISPLAY_NAME_MAX_BYTES: usize = 120;
const PARSE_TIMEOUT: Duration = Duration::from_secs(1200);
const PARSE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How the upload phase of an index job ended.
#[derive(Debug)]
pub enum IndexStart {
    /// The document is uploaded and remote parsing has been kicked off.
    Started { dataset_id: String, doc_id: String },
    /// There was nothing to upload; the job is terminally failed and must
    /// not be retried.
    Rejected { reason: String },
}

/// Resolve the content's dataset, upload the document body and start
/// remote parsing.
#[instrument(skip_all, fields(content_id = job.content_id, job_id = %job.job_id))]
pub async fn start_indexing(job: &IndexJob, state: &WorkerState) -> Result<IndexStart> {
    let dataset_name = job.dataset_name();
    let dataset = match state.rag.find_dataset(&dataset_name).await? {
        Some(dataset) => dataset,
        None => {
            state
                .rag
                .create_dataset(&dataset_name, state.embedding_model.as_deref())
                .await?
        }
    };

    let (body, extension) = upload_body(job, state).await?;
    if body.is_empty() {
        // An empty document would never produce chunks; drop the dataset
        // again so no orphan is left on the remote side.
        if let Err(e) = state.rag.delete_datasets(&[dataset.id.clone()]).await {
            warn!(dataset_id = %dataset.id, error = %e, "Failed to delete empty dataset");
        }
        return Ok(IndexStart::Rejected {
            reason: "upload body is empty".to_string(),
        });
    }

    let cleaned = clean_display_name(&job.title);
    let display_name = format!(
        "{}{}",
        truncate_display_name(&cleaned, DISPLAY_NAME_MAX_BYTES),
        extension
    );

    let document = state
        .rag
        .upload_document(&dataset.id, &display_name, body)
        .await?;

    if job.media_type == MediaType::Pdf {
        state
            .rag
            .update_document_parser(&dataset.id, &document.id, &pdf_parser_config())
            .await?;
    }

    state
        .rag
        .start_parsing(&dataset.id, &[document.id.clone()])
        .await?;

    info!(
        dataset_id = %dataset.id,
        doc_id = %document.id,
        display_name = %display_name,
        "Document uploaded, parsing started"
    );

    Ok(IndexStart::Started {
        dataset_id: dataset.id,
        doc_id: document.id,
    })
}

/// Poll the uploaded document until parsing reaches a terminal state.
///
/// Errors while checking are terminal rather than retried: the document has
/// already been handed to the remote service, and re-running the upload for
/// a status hiccup would duplicate it.
pub async fn wait_for_parsing(
    rag: &RagClient,
    dataset_id: &str,
    doc_id: &str,
) -> (IndexOutcome, Option<String>) {
    let started = Instant::now();

    loop {
        if started.elapsed() > PARSE_TIMEOUT {
            return (
                IndexOutcome::Failed,
                Some(format!(
                    "document processing timed out after {}s",
                    PARSE_TIMEOUT.as_secs()
                )),
            );
        }

        let document = match rag.get_document(dataset_id, doc_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                return (
                    IndexOutcome::Failed,
                    Some("document disappeared while parsing".to_string()),
                );
            }
            Err(e) => {
                return (
                    IndexOutcome::Failed,
                    Some(format!("document status check failed: {e}")),
                );
            }
        };

        debug!(run = ?document.run, chunk_count = document.chunk_count, "Document status");

        match document.run_status() {
            Some(DocRunStatus::Done) if document.chunk_count < 1 => {
                return (
                    IndexOutcome::Failed,
                    Some("document parsed into no chunks".to_string()),
                );
            }
            Some(DocRunStatus::Done) => return (IndexOutcome::Completed, None),
            Some(DocRunStatus::Fail) => {
                let reason = document
                    .progress_msg
                    .unwrap_or_else(|| "document processing failed".to_string());
                return (IndexOutcome::Failed, Some(reason));
            }
            Some(DocRunStatus::Unstart | DocRunStatus::Running) => {}
            _ => {
                let status = document.run.as_deref().unwrap_or("unknown").to_string();
                return (
                    IndexOutcome::Failed,
                    Some(format!("unexpected document status: {status}")),
                );
            }
        }

        tokio::time::sleep(PARSE_POLL_INTERVAL).await;
    }
}

/// The bytes to upload and the file extension for the display name: inline
/// derived text goes up as `.txt`, anything else is the stored file's own
/// bytes under its own extension.
async fn upload_body(job: &IndexJob, state: &WorkerState) -> Result<(Vec<u8>, String)> {
    if let Some(text) = &job.text {
        let body = if text.trim().is_empty() {
            Vec::new()
        } else {
            text.clone().into_bytes()
        };
        return Ok((body, ".txt".to_string()));
    }

    let Some(uri) = &job.storage_file else {
        return Ok((Vec::new(), ".txt".to_string()));
    };

    let bytes = state.storage.download(uri).await?;
    let extension = match uri.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => format!(".{ext}"),
        _ => String::new(),
    };
    Ok((bytes, extension))
}

/// Parser overrides applied to PDF uploads.
fn pdf_parser_config() -> serde_json::Value {
    json!({
        "layout_recognize": "Plain Text",
        "auto_keywords": 0,
        "auto_questions": 0,
        "raptor": { "use_raptor": false },
        "task_page_size": 12,
        "chunk_token_num": 128,
        "delimiter": "\n.!?;。；！？,:：，",
        "pages": [[1, 1024]],
    })
}

/// Strip characters the remote service rejects in display names and
/// collapse whitespace runs.
fn clean_display_name(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '.' | '_'))
        .collect();
    let cleaned = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// Cut a name down to at most `max_bytes` bytes of UTF-8 without splitting
/// a character, via binary search over the char boundaries.
fn truncate_display_name(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let boundaries: Vec<usize> = name.char_indices().map(|(index, _)| index).collect();
    let cut = match boundaries.binary_search(&max_bytes) {
        Ok(position) => boundaries[position],
        Err(position) => boundaries[position - 1],
    };
    &name[..cut]
}
