use std::collections::HashMap;
use std::path::Path as FilePath;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use common::storage::UPLOAD_DIR;
use common::{ContentHash, MediaType, ProcessingStatus, RagStatus};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{info, instrument};

use crate::entity::{content, content_kb_mapping, knowledge_base};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::ingest;
use crate::models::content::{
    AudioQuotaResponse, BatchCreateRequest, BatchCreateResponse, BatchCreatedItem,
    ContentListQuery, ContentResponse, ContentUidsRequest, CreateContentRequest, KbBrief,
    PageUrlResponse, ResponseContext, page_url,
};
use crate::models::shared::{CursorPage, new_uid, validate_uid_list, validate_url};
use crate::state::AppState;

/// Create content from a URL.
#[utoipa::path(
    post,
    path = "",
    tag = "Contents",
    operation_id = "createContent",
    summary = "Create content from a URL",
    description = "Detects the media type from the URL (YouTube, tweet, Spotify episode, \
        anything else is an article) and starts extraction in the background. Submitting a \
        URL the user already has returns the existing row with a 200.",
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Content created, extraction started", body = ContentResponse),
        (status = 200, description = "URL already ingested, existing content returned", body = ContentResponse),
        (status = 400, description = "Invalid URL or audio budget exhausted (VALIDATION_ERROR, TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn create_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateContentRequest>,
) -> Result<Response, AppError> {
    let url = payload.url.trim().to_string();
    let parsed = validate_url(&url)?;

    let kb = match &payload.kb_uid {
        Some(kb_uid) => Some(ensure_owned_kb(&state.db, kb_uid, auth_user.user_id).await?),
        None => None,
    };

    if let Some(existing) = content::Entity::find()
        .filter(content::Column::UserId.eq(auth_user.user_id))
        .filter(content::Column::Source.eq(&url))
        .filter(content::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?
    {
        let touch = content::ActiveModel {
            id: Set(existing.id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        touch.update(&state.db).await?;
        info!(content_id = existing.id, "existing content returned for repeated url");

        let belonged = belonged_kbs(&state.db, existing.id).await?;
        let response = detail_response(&state, existing, true, Some(belonged));
        return Ok((StatusCode::OK, Json(response)).into_response());
    }

    let media_type = detect_media_type(&parsed);
    if media_type == MediaType::SpotifyAudio {
        ensure_audio_budget(&state, auth_user.user_id).await?;
    }

    let model = new_content_row(
        auth_user.user_id,
        media_type,
        Some(url),
        ProcessingStatus::Pending,
    )
    .insert(&state.db)
    .await?;

    if let Some(kb) = &kb {
        map_into_kb(&state.db, model.id, kb.id, auth_user.user_id).await?;
    }

    info!(
        content_id = model.id,
        uid = %model.uid,
        media_type = %media_type,
        "content created"
    );
    ingest::dispatch(state.clone(), model.id, model.attempt_generation);

    let belonged = kb.map(|kb| {
        vec![KbBrief {
            uid: kb.uid,
            name: kb.name,
        }]
    });
    let response = detail_response(&state, model, true, belonged);
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Create a batch of upload placeholders.
#[utoipa::path(
    post,
    path = "/batch",
    tag = "Contents",
    operation_id = "batchCreateContents",
    summary = "Create a batch of upload placeholders",
    description = "Creates one placeholder row per item, all sharing a batch id. Each row \
        waits for its file via `POST /contents/{uid}/upload`.",
    request_body = BatchCreateRequest,
    responses(
        (status = 201, description = "Placeholders created", body = BatchCreateResponse),
        (status = 400, description = "Empty or oversized batch (VALIDATION_ERROR, TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn batch_create(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<BatchCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("No items provided".into()));
    }
    let max = state.config.ingest.batch_max_items;
    if payload.items.len() > max {
        return Err(AppError::Validation(format!("Too many items: max {max}")));
    }

    if payload.items.iter().any(|item| item.media_type.is_audio()) {
        ensure_audio_budget(&state, auth_user.user_id).await?;
    }

    // Resolve every referenced knowledge base up front so a bad uid fails
    // the whole batch before any row is written.
    let mut kb_by_uid: HashMap<String, knowledge_base::Model> = HashMap::new();
    for item in &payload.items {
        if let Some(kb_uid) = &item.kb_uid
            && !kb_by_uid.contains_key(kb_uid)
        {
            let kb = ensure_owned_kb(&state.db, kb_uid, auth_user.user_id).await?;
            kb_by_uid.insert(kb_uid.clone(), kb);
        }
    }

    let batch_id = new_uid();
    let mut items = Vec::with_capacity(payload.items.len());
    for item in payload.items {
        let mut row = new_content_row(
            auth_user.user_id,
            item.media_type,
            None,
            ProcessingStatus::WaitingInit,
        );
        row.batch_id = Set(Some(batch_id.clone()));
        row.title = Set(Some(item.file_name.clone()));
        let model = row.insert(&state.db).await?;

        if let Some(kb) = item.kb_uid.as_ref().and_then(|uid| kb_by_uid.get(uid)) {
            map_into_kb(&state.db, model.id, kb.id, auth_user.user_id).await?;
        }

        items.push(BatchCreatedItem {
            uid: model.uid,
            media_type: item.media_type,
            file_name: item.file_name,
            // Placeholders read as PENDING everywhere outside the server.
            status: ProcessingStatus::Pending,
        });
    }

    info!(%batch_id, count = items.len(), "batch placeholders created");
    Ok((
        StatusCode::CREATED,
        Json(BatchCreateResponse { batch_id, items }),
    ))
}

/// Upload a file and create content from it.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Contents",
    operation_id = "uploadContent",
    summary = "Upload a file and create content from it",
    description = "Multipart form with a required `file` and `media_type`, plus optional \
        `source_url` and `audio_language` fields. The file is stored and extraction starts \
        in the background.",
    request_body(content_type = "multipart/form-data", description = "File upload with media type"),
    responses(
        (status = 201, description = "Content created, extraction started", body = ContentResponse),
        (status = 400, description = "Bad upload (VALIDATION_ERROR, FILE_TOO_LARGE, FILE_TYPE_NOT_SUPPORTED, TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart))]
pub async fn upload_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_upload_form(&mut multipart).await?;
    let media_type = form
        .media_type
        .ok_or_else(|| AppError::Validation("media_type is required".into()))?;
    if !media_type.is_file_based() {
        return Err(AppError::UnsupportedFileType);
    }
    let file_name = form
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::Validation("File name is required".into()))?;
    let data = form
        .bytes
        .ok_or_else(|| AppError::Validation("Valid file must be provided".into()))?;

    if media_type.is_audio() {
        ensure_audio_budget(&state, auth_user.user_id).await?;
    }

    let stored = store_upload(&state, &auth_user.username, &file_name, &data).await?;

    let source = form
        .source_url
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let mut row = new_content_row(auth_user.user_id, media_type, source, ProcessingStatus::Pending);
    row.file_name_in_storage = Set(Some(stored.uri));
    row.file_type = Set(Some(stored.file_type));
    row.title = Set(Some(stored.title));
    if media_type.is_audio() {
        row.lang = Set(form.audio_language.as_deref().and_then(normalize_language));
    }
    let model = row.insert(&state.db).await?;

    info!(
        content_id = model.id,
        uid = %model.uid,
        media_type = %model.media_type,
        "upload content created"
    );
    ingest::dispatch(state.clone(), model.id, model.attempt_generation);

    let response = detail_response(&state, model, true, None);
    Ok((StatusCode::CREATED, Json(response)))
}

/// Attach a file to a batch placeholder.
#[utoipa::path(
    post,
    path = "/{uid}/upload",
    tag = "Contents",
    operation_id = "uploadToPlaceholder",
    summary = "Attach a file to a batch placeholder",
    description = "Uploads the file for a placeholder created by the batch endpoint. Only \
        rows still waiting for their file accept an upload.",
    params(("uid" = String, Path, description = "Content uid")),
    request_body(content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 200, description = "File attached, extraction started", body = ContentResponse),
        (status = 400, description = "Bad upload (VALIDATION_ERROR, FILE_TOO_LARGE, FILE_TYPE_NOT_SUPPORTED, TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Content already has its file (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart))]
pub async fn upload_to_placeholder(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ContentResponse>, AppError> {
    let row = find_active_by_uid(&state.db, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;
    if row.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }
    if row.processing_status != ProcessingStatus::WaitingInit {
        return Err(AppError::Conflict("Content already has its file".into()));
    }
    if !row.media_type.is_file_based() {
        return Err(AppError::UnsupportedFileType);
    }

    let form = read_upload_form(&mut multipart).await?;
    let file_name = form
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::Validation("File name is required".into()))?;
    let data = form
        .bytes
        .ok_or_else(|| AppError::Validation("Valid file must be provided".into()))?;

    if row.media_type.is_audio() {
        ensure_audio_budget(&state, auth_user.user_id).await?;
    }

    let stored = store_upload(&state, &auth_user.username, &file_name, &data).await?;

    let mut update = content::ActiveModel {
        id: Set(row.id),
        processing_status: Set(ProcessingStatus::Pending),
        file_name_in_storage: Set(Some(stored.uri)),
        file_type: Set(Some(stored.file_type)),
        title: Set(Some(stored.title)),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if row.media_type.is_audio() {
        update.lang = Set(form.audio_language.as_deref().and_then(normalize_language));
    }
    let model = update.update(&state.db).await?;

    info!(content_id = model.id, uid = %model.uid, "placeholder received its file");
    ingest::dispatch(state.clone(), model.id, model.attempt_generation);

    Ok(Json(detail_response(&state, model, true, None)))
}

/// List the caller's contents, newest first.
#[utoipa::path(
    get,
    path = "",
    tag = "Contents",
    operation_id = "listContents",
    summary = "List own contents",
    description = "Cursor-paginated list of the caller's contents, newest first. Pass the \
        `next_cursor` of the previous page to continue.",
    params(ContentListQuery),
    responses(
        (status = 200, description = "Page of contents", body = CursorPage<ContentResponse>),
        (status = 400, description = "Unknown cursor (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_contents(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ContentListQuery>,
) -> Result<Json<CursorPage<ContentResponse>>, AppError> {
    let limit = params.limit.clamp(1, 200);

    let mut query = content::Entity::find()
        .filter(content::Column::UserId.eq(auth_user.user_id))
        .filter(content::Column::IsDeleted.eq(false));

    if let Some(cursor) = &params.cursor {
        let anchor = content::Entity::find()
            .filter(content::Column::Uid.eq(cursor))
            .filter(content::Column::UserId.eq(auth_user.user_id))
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::Validation("Unknown cursor".into()))?;
        // Id breaks created_at ties so batch-created rows are not skipped.
        query = query.filter(
            Condition::any()
                .add(content::Column::CreatedAt.lt(anchor.created_at))
                .add(
                    Condition::all()
                        .add(content::Column::CreatedAt.eq(anchor.created_at))
                        .add(content::Column::Id.lt(anchor.id)),
                ),
        );
    }

    let mut rows = query
        .order_by_desc(content::Column::CreatedAt)
        .order_by_desc(content::Column::Id)
        .limit(limit + 1)
        .all(&state.db)
        .await?;

    let next_cursor = if rows.len() as u64 > limit {
        rows.truncate(limit as usize);
        rows.last().map(|row| row.uid.clone())
    } else {
        None
    };

    let items = rows
        .into_iter()
        .map(|model| {
            let ctx = ResponseContext {
                owned: true,
                file_url: stored_file_url(&state, &model),
                content_page_url: &state.config.server.content_page_url,
                belonged_kbs: None,
            };
            ContentResponse::list_view(model, ctx)
        })
        .collect();

    Ok(Json(CursorPage { items, next_cursor }))
}

/// Fetch several contents by uid.
#[utoipa::path(
    post,
    path = "/uids",
    tag = "Contents",
    operation_id = "getContentsByUids",
    summary = "Fetch several contents by uid",
    description = "Returns full detail for each uid. Contents owned by other users are \
        included with `owned` set to false.",
    request_body = ContentUidsRequest,
    responses(
        (status = 200, description = "Matching contents", body = Vec<ContentResponse>),
        (status = 400, description = "Bad uid list (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn contents_by_uids(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ContentUidsRequest>,
) -> Result<Json<Vec<ContentResponse>>, AppError> {
    validate_uid_list(&payload.uids, "content uids", 100)?;

    let rows = content::Entity::find()
        .filter(content::Column::Uid.is_in(payload.uids.clone()))
        .filter(content::Column::IsDeleted.eq(false))
        .all(&state.db)
        .await?;

    let items = rows
        .into_iter()
        .map(|model| {
            let owned = model.user_id == auth_user.user_id;
            detail_response(&state, model, owned, None)
        })
        .collect();

    Ok(Json(items))
}

/// Report the caller's audio transcription budget.
#[utoipa::path(
    get,
    path = "/audio-quota",
    tag = "Contents",
    operation_id = "getAudioQuota",
    summary = "Audio transcription budget",
    responses(
        (status = 200, description = "Seconds used and remaining allowance", body = AudioQuotaResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn audio_quota(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AudioQuotaResponse>, AppError> {
    let used_seconds = ingest::audio_seconds_used(&state.db, auth_user.user_id).await?;
    let limit_seconds = state.config.ingest.total_audio_max_seconds;
    Ok(Json(AudioQuotaResponse {
        used_seconds,
        limit_seconds,
        allowed: used_seconds < limit_seconds,
    }))
}

/// Fetch one content by uid.
#[utoipa::path(
    get,
    path = "/{uid}",
    tag = "Contents",
    operation_id = "getContent",
    summary = "Fetch one content",
    description = "Full detail view. Readable by any authenticated user; `owned` tells the \
        caller whether it is theirs.",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 200, description = "Content detail", body = ContentResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn get_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ContentResponse>, AppError> {
    let model = find_active_by_uid(&state.db, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;

    let owned = model.user_id == auth_user.user_id;
    let belonged = belonged_kbs(&state.db, model.id).await?;
    Ok(Json(detail_response(&state, model, owned, Some(belonged))))
}

/// Retry a failed extraction.
#[utoipa::path(
    post,
    path = "/{uid}/retry",
    tag = "Contents",
    operation_id = "retryContent",
    summary = "Retry a failed extraction",
    description = "Bumps the attempt generation, resets the retrieval linkage and runs the \
        pipeline again. Only failed contents can be retried.",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 200, description = "Retry started", body = ContentResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Content is not failed (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn retry_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ContentResponse>, AppError> {
    let txn = state.db.begin().await?;

    let row = content::Entity::find()
        .filter(content::Column::Uid.eq(&uid))
        .filter(content::Column::IsDeleted.eq(false))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;

    if row.user_id != auth_user.user_id {
        txn.rollback().await?;
        return Err(AppError::PermissionDenied);
    }
    if row.processing_status != ProcessingStatus::Failed {
        txn.rollback().await?;
        return Err(AppError::Conflict("Only failed content can be retried".into()));
    }

    let next_generation = row.attempt_generation + 1;
    let update = content::ActiveModel {
        id: Set(row.id),
        processing_status: Set(ProcessingStatus::Pending),
        rag_status: Set(RagStatus::WaitingInit),
        dataset_id: Set(None),
        dataset_doc_id: Set(None),
        attempt_generation: Set(next_generation),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    let model = update.update(&txn).await?;
    txn.commit().await?;

    info!(
        content_id = model.id,
        generation = next_generation,
        "retry started"
    );
    ingest::dispatch(state.clone(), model.id, next_generation);

    Ok(Json(detail_response(&state, model, true, None)))
}

/// Soft-delete a content.
#[utoipa::path(
    delete,
    path = "/{uid}",
    tag = "Contents",
    operation_id = "deleteContent",
    summary = "Delete a content",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 204, description = "Content deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn delete_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, AppError> {
    let row = find_active_by_uid(&state.db, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;
    if row.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }

    let update = content::ActiveModel {
        id: Set(row.id),
        is_deleted: Set(true),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    update.update(&state.db).await?;

    info!(content_id = row.id, "content deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Count a page view.
#[utoipa::path(
    post,
    path = "/{uid}/view",
    tag = "Contents",
    operation_id = "countContentView",
    summary = "Count a page view",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 200, description = "View counted", body = PageUrlResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state))]
pub async fn count_view(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<PageUrlResponse>, AppError> {
    bump_counter(&state, &uid, content::Column::ViewCount).await
}

/// Count a share.
#[utoipa::path(
    post,
    path = "/{uid}/share",
    tag = "Contents",
    operation_id = "countContentShare",
    summary = "Count a share",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 200, description = "Share counted", body = PageUrlResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state))]
pub async fn count_share(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<PageUrlResponse>, AppError> {
    bump_counter(&state, &uid, content::Column::ShareCount).await
}

/// Atomic in-place increment, so concurrent counts are not lost.
async fn bump_counter(
    state: &AppState,
    uid: &str,
    column: content::Column,
) -> Result<Json<PageUrlResponse>, AppError> {
    let result = content::Entity::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .filter(content::Column::Uid.eq(uid))
        .filter(content::Column::IsDeleted.eq(false))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Content not found".into()));
    }

    Ok(Json(PageUrlResponse {
        page_url: page_url(&state.config.server.content_page_url, uid),
    }))
}

/// Body cap for multipart uploads; the slack covers the non-file fields.
pub fn upload_body_limit(max_upload_bytes: usize) -> axum::extract::DefaultBodyLimit {
    axum::extract::DefaultBodyLimit::max(max_upload_bytes + 64 * 1024)
}

/// Which ingestion branch a URL belongs to.
pub(crate) fn detect_media_type(url: &url::Url) -> MediaType {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    match host {
        "youtube.com" | "m.youtube.com" | "youtu.be" => MediaType::Video,
        "twitter.com" | "x.com" | "mobile.twitter.com" if url.path().contains("/status/") => {
            MediaType::Twitter
        }
        "open.spotify.com" if url.path().starts_with("/episode") => MediaType::SpotifyAudio,
        _ => MediaType::Article,
    }
}

struct UploadForm {
    source_url: Option<String>,
    media_type: Option<MediaType>,
    audio_language: Option<String>,
    file_name: Option<String>,
    bytes: Option<bytes::Bytes>,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        source_url: None,
        media_type: None,
        audio_language: None,
        file_name: None,
        bytes: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("source_url") => form.source_url = Some(field_text(field).await?),
            Some("media_type") => {
                let raw = field_text(field).await?;
                let media_type = raw
                    .trim()
                    .parse::<MediaType>()
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                form.media_type = Some(media_type);
            }
            Some("audio_language") => form.audio_language = Some(field_text(field).await?),
            Some("file") => {
                form.file_name = field.file_name().map(|name| name.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?;
                form.bytes = Some(data);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))
}

struct StoredUpload {
    uri: String,
    title: String,
    file_type: String,
}

async fn store_upload(
    state: &AppState,
    username: &str,
    file_name: &str,
    data: &[u8],
) -> Result<StoredUpload, AppError> {
    if data.is_empty() {
        return Err(AppError::Validation("Valid file must be provided".into()));
    }
    if data.len() > state.config.ingest.max_upload_bytes {
        return Err(AppError::FileTooLarge);
    }

    let uri = upload_object_name(username, Utc::now().timestamp(), file_name);
    state.storage.save(&uri, data).await?;
    info!(%uri, size = data.len(), "upload stored");

    let title = FilePath::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| file_name.to_string());
    let file_type = mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .to_string();

    Ok(StoredUpload {
        uri,
        title,
        file_type,
    })
}

/// Collision-free storage name: a digest of who uploaded what and when,
/// keeping the original extension.
fn upload_object_name(username: &str, timestamp: i64, file_name: &str) -> String {
    let digest = ContentHash::compute(&format!("{username}{timestamp}{file_name}")).to_hex();
    match FilePath::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{UPLOAD_DIR}/{digest}.{ext}"),
        None => format!("{UPLOAD_DIR}/{digest}"),
    }
}

/// Reduce a BCP-47 tag to its primary subtag ("en-AU" -> "en").
fn normalize_language(raw: &str) -> Option<String> {
    let primary = raw
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    ((2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic()))
        .then_some(primary)
}

async fn ensure_audio_budget(state: &AppState, user_id: i32) -> Result<(), AppError> {
    let used = ingest::audio_seconds_used(&state.db, user_id).await?;
    if used >= state.config.ingest.total_audio_max_seconds {
        return Err(AppError::TotalAudioQuotaExceeded);
    }
    Ok(())
}

async fn ensure_owned_kb(
    db: &DatabaseConnection,
    kb_uid: &str,
    user_id: i32,
) -> Result<knowledge_base::Model, AppError> {
    knowledge_base::Entity::find()
        .filter(knowledge_base::Column::Uid.eq(kb_uid))
        .filter(knowledge_base::Column::UserId.eq(user_id))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found".into()))
}

pub(crate) async fn find_active_by_uid(
    db: &DatabaseConnection,
    uid: &str,
) -> Result<Option<content::Model>, DbErr> {
    content::Entity::find()
        .filter(content::Column::Uid.eq(uid))
        .filter(content::Column::IsDeleted.eq(false))
        .one(db)
        .await
}

async fn map_into_kb(
    db: &DatabaseConnection,
    content_id: i32,
    knowledge_base_id: i32,
    user_id: i32,
) -> Result<(), DbErr> {
    content_kb_mapping::ActiveModel {
        content_id: Set(content_id),
        knowledge_base_id: Set(knowledge_base_id),
        created_by: Set(user_id),
        is_deleted: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Knowledge bases a content currently sits in, for detail responses.
pub(crate) async fn belonged_kbs(
    db: &DatabaseConnection,
    content_id: i32,
) -> Result<Vec<KbBrief>, DbErr> {
    let rows = content_kb_mapping::Entity::find()
        .filter(content_kb_mapping::Column::ContentId.eq(content_id))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .find_also_related(knowledge_base::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(_, kb)| kb)
        .filter(|kb| !kb.is_deleted)
        .map(|kb| KbBrief {
            uid: kb.uid,
            name: kb.name,
        })
        .collect())
}

fn new_content_row(
    user_id: i32,
    media_type: MediaType,
    source: Option<String>,
    status: ProcessingStatus,
) -> content::ActiveModel {
    let now = Utc::now();
    content::ActiveModel {
        uid: Set(new_uid()),
        user_id: Set(user_id),
        media_type: Set(media_type),
        processing_status: Set(status),
        rag_status: Set(RagStatus::WaitingInit),
        source: Set(source),
        attempt_generation: Set(0),
        view_count: Set(0),
        share_count: Set(0),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

fn stored_file_url(state: &AppState, model: &content::Model) -> Option<String> {
    model
        .file_name_in_storage
        .as_deref()
        .map(|uri| state.storage.get_url(uri))
}

fn detail_response(
    state: &AppState,
    model: content::Model,
    owned: bool,
    belonged_kbs: Option<Vec<KbBrief>>,
) -> ContentResponse {
    let file_url = stored_file_url(state, &model);
    let ctx = ResponseContext {
        owned,
        file_url,
        content_page_url: &state.config.server.content_page_url,
        belonged_kbs,
    };
    ContentResponse::from_model(model, ctx)
}
