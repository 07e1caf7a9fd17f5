//! Content extraction pipeline.
//!
//! `process_content` is spawned fire-and-forget after create, upload and
//! retry. It verifies the row is still PENDING under the caller's attempt
//! generation, runs the media-type branch, then lands the row in COMPLETED
//! or FAILED with a guarded update. A retry bumps the generation, so a
//! superseded task's final update matches zero rows and is dropped instead
//! of overwriting newer state.

pub mod article;
pub mod audio;
pub mod file;
pub mod image;
pub mod spotify;
pub mod twitter;
pub mod video;

use chrono::Utc;
use clients::error::ClientError;
use common::storage::StorageError;
use common::subtitles::{format_subtitles, format_subtitles_compact};
use common::{EnrichJob, IndexJob, MediaType, ProcessingStatus, RagStatus, SubtitleSegment};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, error, info, instrument, warn};

use crate::entity::content;
use crate::models::content::parse_subtitles;
use crate::state::AppState;

/// Error raised by an extraction branch.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("media type {0} cannot be parsed yet")]
    Unsupported(MediaType),
    #[error("audio runs {actual:.0}s, over the {limit:.0}s single-file limit")]
    SingleAudioExceeded { actual: f64, limit: f64 },
    #[error("total audio duration would exceed the {limit:.0}s quota")]
    TotalAudioExceeded { limit: f64 },
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Db(#[from] DbErr),
}

impl IngestError {
    /// Stable code for the notification log event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "FILE_TYPE_NOT_SUPPORTED",
            Self::SingleAudioExceeded { .. } => "SINGLE_AUDIO_EXCEEDS_DURATION_LIMIT",
            Self::TotalAudioExceeded { .. } => "TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT",
            _ => "EXTRACTION_FAILED",
        }
    }
}

/// Field updates produced by an extraction branch. `None` leaves the
/// column untouched.
#[derive(Debug, Default)]
pub struct Extraction {
    pub title: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    pub lang: Option<String>,
    pub published_time: Option<chrono::NaiveDateTime>,
    pub cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub content: Option<String>,
    pub text_content: Option<String>,
    pub raw_description: Option<String>,
    pub image_ocr: Option<String>,
    pub content_hash: Option<String>,
    pub media_subtitles: Option<Vec<SubtitleSegment>>,
    pub media_seconds_duration: Option<f64>,
    pub video_embed_url: Option<String>,
    pub file_name_in_storage: Option<String>,
    pub file_type: Option<String>,
}

impl Extraction {
    /// Overlay the extracted fields onto the claimed row.
    fn merge_into(self, base: &content::Model) -> content::Model {
        let mut merged = base.clone();
        if let Some(v) = self.title {
            merged.title = Some(v);
        }
        if let Some(v) = self.author {
            merged.author = Some(v);
        }
        if let Some(v) = self.site_name {
            merged.site_name = Some(v);
        }
        if let Some(v) = self.lang {
            merged.lang = Some(v);
        }
        if let Some(v) = self.published_time {
            merged.published_time = Some(v);
        }
        if let Some(v) = self.cover {
            merged.cover = Some(v);
        }
        if let Some(v) = self.images {
            merged.images = Some(serde_json::to_value(v).unwrap_or_default());
        }
        if let Some(v) = self.content {
            merged.content = Some(v);
        }
        if let Some(v) = self.text_content {
            merged.text_content = Some(v);
        }
        if let Some(v) = self.raw_description {
            merged.raw_description = Some(v);
        }
        if let Some(v) = self.image_ocr {
            merged.image_ocr = Some(v);
        }
        if let Some(v) = self.content_hash {
            merged.content_hash = Some(v);
        }
        if let Some(v) = self.media_subtitles {
            merged.media_subtitles = Some(serde_json::to_value(v).unwrap_or_default());
        }
        if let Some(v) = self.media_seconds_duration {
            merged.media_seconds_duration = Some(v);
        }
        if let Some(v) = self.video_embed_url {
            merged.video_embed_url = Some(v);
        }
        if let Some(v) = self.file_name_in_storage {
            merged.file_name_in_storage = Some(v);
        }
        if let Some(v) = self.file_type {
            merged.file_type = Some(v);
        }
        merged
    }
}

/// Spawn extraction for a content row. Fire-and-forget.
pub fn dispatch(state: AppState, content_id: i32, generation: i32) {
    tokio::spawn(async move {
        if let Err(e) = process_content(&state, content_id, generation).await {
            error!(content_id, generation, error = %e, "content processing aborted");
        }
    });
}

/// Run extraction for one content row under the given attempt generation.
#[instrument(skip(state))]
pub async fn process_content(
    state: &AppState,
    content_id: i32,
    generation: i32,
) -> Result<(), DbErr> {
    let Some(claimed) = claim(&state.db, content_id, generation).await? else {
        return Ok(());
    };

    info!(media_type = %claimed.media_type, "extraction started");

    match run_branch(state, &claimed).await {
        Ok(extraction) => {
            let merged = extraction.merge_into(&claimed);
            complete(state, merged, generation).await
        }
        Err(e) => {
            // Surfaced to the user through the row status; the code keys
            // the client-side failure message.
            warn!(
                code = e.code(),
                error = %e,
                "extraction failed"
            );
            fail(&state.db, content_id, generation).await
        }
    }
}

async fn run_branch(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    match content.media_type {
        MediaType::Article => article::extract(state, content).await,
        MediaType::Video => video::extract(state, content).await,
        MediaType::SpotifyAudio => spotify::extract(state, content).await,
        MediaType::Twitter => twitter::extract(state, content).await,
        MediaType::Image => image::extract(state, content).await,
        MediaType::Audio | MediaType::AudioInternal | MediaType::AudioMicrophone => {
            audio::extract(state, content).await
        }
        MediaType::Pdf | MediaType::Word | MediaType::Excel | MediaType::Ppt | MediaType::Text => {
            file::extract(state, content).await
        }
    }
}

/// Verify the row is still ours to process. Returns `None` when the row is
/// gone, no longer PENDING, or owned by a newer generation.
async fn claim(
    db: &DatabaseConnection,
    content_id: i32,
    generation: i32,
) -> Result<Option<content::Model>, DbErr> {
    let txn = db.begin().await?;

    let Some(row) = content::Entity::find_by_id(content_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        debug!(content_id, "content row gone, nothing to process");
        return Ok(None);
    };

    if row.attempt_generation != generation {
        info!(
            content_id,
            generation,
            current = row.attempt_generation,
            "stale claim dropped"
        );
        txn.rollback().await?;
        return Ok(None);
    }

    if row.processing_status != ProcessingStatus::Pending {
        info!(
            content_id,
            status = %row.processing_status,
            "row not pending, skipping"
        );
        txn.rollback().await?;
        return Ok(None);
    }

    txn.commit().await?;
    Ok(Some(row))
}

/// Persist extracted fields and move PENDING -> COMPLETED, then enqueue the
/// follow-on jobs. The WHERE clause re-checks status and generation so a
/// superseded attempt updates nothing.
async fn complete(state: &AppState, merged: content::Model, generation: i32) -> Result<(), DbErr> {
    let update = content::ActiveModel {
        title: Set(merged.title.clone()),
        author: Set(merged.author.clone()),
        site_name: Set(merged.site_name.clone()),
        lang: Set(merged.lang.clone()),
        published_time: Set(merged.published_time),
        cover: Set(merged.cover.clone()),
        images: Set(merged.images.clone()),
        content: Set(merged.content.clone()),
        text_content: Set(merged.text_content.clone()),
        raw_description: Set(merged.raw_description.clone()),
        image_ocr: Set(merged.image_ocr.clone()),
        content_hash: Set(merged.content_hash.clone()),
        media_subtitles: Set(merged.media_subtitles.clone()),
        media_seconds_duration: Set(merged.media_seconds_duration),
        video_embed_url: Set(merged.video_embed_url.clone()),
        file_name_in_storage: Set(merged.file_name_in_storage.clone()),
        file_type: Set(merged.file_type.clone()),
        processing_status: Set(ProcessingStatus::Completed),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = content::Entity::update_many()
        .set(update)
        .filter(content::Column::Id.eq(merged.id))
        .filter(content::Column::AttemptGeneration.eq(generation))
        .filter(content::Column::ProcessingStatus.eq(ProcessingStatus::Pending))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        info!(content_id = merged.id, generation, "stale completion dropped");
        return Ok(());
    }

    info!(content_id = merged.id, generation, "extraction completed");
    enqueue_follow_on_jobs(state, &merged).await;
    Ok(())
}

/// Move PENDING -> FAILED under the same generation guard.
async fn fail(db: &DatabaseConnection, content_id: i32, generation: i32) -> Result<(), DbErr> {
    let update = content::ActiveModel {
        processing_status: Set(ProcessingStatus::Failed),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = content::Entity::update_many()
        .set(update)
        .filter(content::Column::Id.eq(content_id))
        .filter(content::Column::AttemptGeneration.eq(generation))
        .filter(content::Column::ProcessingStatus.eq(ProcessingStatus::Pending))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        info!(content_id, generation, "stale failure dropped");
    }
    Ok(())
}

/// Enqueue the AI-enrichment job and, for rows not yet handed to the
/// retrieval service, the index job.
async fn enqueue_follow_on_jobs(state: &AppState, content: &content::Model) {
    let Some(ref mq) = state.mq else {
        debug!(content_id = content.id, "MQ unavailable, skipping enqueue");
        return;
    };

    let source_text = enrichment_source(content);
    if source_text.trim().is_empty() {
        warn!(content_id = content.id, "no derived text, enrichment skipped");
    } else {
        let job = EnrichJob::new(
            content.id,
            content.attempt_generation,
            content.media_type,
            source_text,
        );
        match mq
            .publish(&state.config.mq.enrich_queue_name, None, &job, None)
            .await
        {
            Ok(_) => info!(content_id = content.id, job_id = %job.job_id, "enrich job enqueued"),
            Err(e) => warn!(content_id = content.id, error = %e, "failed to enqueue enrich job"),
        }
    }

    if content.rag_status != RagStatus::WaitingInit {
        debug!(
            content_id = content.id,
            rag_status = %content.rag_status,
            "rag linkage already advanced, index job skipped"
        );
        return;
    }

    let Some(job) = index_job_for(content) else {
        warn!(content_id = content.id, "no index body, index job skipped");
        return;
    };
    match mq
        .publish(&state.config.mq.index_queue_name, None, &job, None)
        .await
    {
        Ok(_) => info!(content_id = content.id, job_id = %job.job_id, "index job enqueued"),
        Err(e) => warn!(content_id = content.id, error = %e, "failed to enqueue index job"),
    }
}

/// Text handed to the enrichment job: timestamped subtitle lines for
/// timeline media, the plain extracted text otherwise.
pub(crate) fn enrichment_source(content: &content::Model) -> String {
    if content.media_type.has_timeline() {
        let segments = parse_subtitles(content.media_subtitles.as_ref());
        format_subtitles(&segments)
    } else {
        content.text_content.clone().unwrap_or_default()
    }
}

/// Build the index job for a completed row, if it has anything to upload.
pub(crate) fn index_job_for(content: &content::Model) -> Option<IndexJob> {
    let title = content
        .title
        .clone()
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| content.uid.clone());

    let (text, storage_file) = match content.media_type {
        MediaType::Article | MediaType::Twitter => (content.content.clone(), None),
        media if media.has_timeline() => {
            let segments = parse_subtitles(content.media_subtitles.as_ref());
            (Some(format_subtitles_compact(&segments)), None)
        }
        MediaType::Image => (
            content.image_ocr.clone().or_else(|| content.content.clone()),
            None,
        ),
        _ => (None, content.file_name_in_storage.clone()),
    };

    let has_text = text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_text && storage_file.is_none() {
        return None;
    }

    Some(IndexJob::new(
        content.id,
        content.attempt_generation,
        content.uid.clone(),
        content.media_type,
        title,
        text.filter(|t| !t.trim().is_empty()),
        storage_file,
    ))
}

/// Seconds of audio the user has already spent, counting in-flight and
/// finished rows.
pub async fn audio_seconds_used<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<f64, DbErr> {
    let total: Option<Option<f64>> = content::Entity::find()
        .select_only()
        .column_as(
            Expr::col(content::Column::MediaSecondsDuration).sum(),
            "total",
        )
        .filter(content::Column::UserId.eq(user_id))
        .filter(content::Column::MediaType.is_in(MediaType::AUDIO.iter().copied()))
        .filter(content::Column::IsDeleted.eq(false))
        .filter(
            content::Column::ProcessingStatus
                .is_in([ProcessingStatus::Pending, ProcessingStatus::Completed]),
        )
        .into_tuple()
        .one(conn)
        .await?;

    Ok(total.flatten().unwrap_or(0.0))
}
