use std::collections::{HashMap, HashSet};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use common::ProcessingStatus;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use tracing::{info, instrument};

use crate::entity::knowledge_base::KbVisibility;
use crate::entity::{content, content_kb_mapping, kb_subscription, knowledge_base, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::content::find_active_by_uid;
use crate::models::content::{ContentResponse, ResponseContext};
use crate::models::knowledge_base::{
    AddContentsRequest, AddContentsResponse, AvailableContentItem, CreateKnowledgeBaseRequest,
    KbStats, KnowledgeBaseListResponse, KnowledgeBaseResponse, UpdateKnowledgeBaseRequest,
};
use crate::models::shared::{Page, PageQuery, new_uid, validate_name, validate_uid_list};
use crate::state::AppState;

/// Create a knowledge base.
#[utoipa::path(
    post,
    path = "",
    tag = "Knowledge Bases",
    operation_id = "createKnowledgeBase",
    summary = "Create a knowledge base",
    request_body = CreateKnowledgeBaseRequest,
    responses(
        (status = 201, description = "Knowledge base created", body = KnowledgeBaseResponse),
        (status = 400, description = "Invalid input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn create_kb(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateKnowledgeBaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_name(&payload.name, "Name")?;

    let owner = load_user(&state.db, auth_user.user_id).await?;
    let now = Utc::now();
    let kb = knowledge_base::ActiveModel {
        uid: Set(new_uid()),
        user_id: Set(auth_user.user_id),
        name: Set(payload.name.trim().to_string()),
        description: Set(clean_description(payload.description)),
        visibility: Set(payload.visibility.unwrap_or(KbVisibility::Private)),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    info!(kb_id = kb.id, uid = %kb.uid, "knowledge base created");
    let response = KnowledgeBaseResponse::build(
        kb,
        Some(&owner),
        KbStats::default(),
        true,
        false,
        &state.config.server.kb_share_page_url,
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// Update a knowledge base.
#[utoipa::path(
    patch,
    path = "/{uid}",
    tag = "Knowledge Bases",
    operation_id = "updateKnowledgeBase",
    summary = "Update a knowledge base",
    description = "Partial update of name, description and visibility. A base with active \
        subscribers cannot be made private.",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    request_body = UpdateKnowledgeBaseRequest,
    responses(
        (status = 200, description = "Knowledge base updated", body = KnowledgeBaseResponse),
        (status = 400, description = "Invalid input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Subscribers block the visibility change (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn update_kb(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    AppJson(payload): AppJson<UpdateKnowledgeBaseRequest>,
) -> Result<Json<KnowledgeBaseResponse>, AppError> {
    let kb = find_owned_kb(&state.db, &uid, auth_user.user_id).await?;

    if let Some(name) = &payload.name {
        validate_name(name, "Name")?;
    }
    if let Some(new_visibility) = payload.visibility
        && new_visibility != kb.visibility
        && new_visibility == KbVisibility::Private
    {
        let subscribers = active_subscriber_count(&state.db, kb.id).await?;
        if subscribers > 0 {
            return Err(AppError::Conflict(
                "Cannot change visibility to private when there are subscribers".into(),
            ));
        }
    }

    let mut update = knowledge_base::ActiveModel {
        id: Set(kb.id),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if let Some(name) = payload.name {
        update.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        update.description = Set(clean_description(description));
    }
    if let Some(visibility) = payload.visibility {
        update.visibility = Set(visibility);
    }
    let kb = update.update(&state.db).await?;

    info!(kb_id = kb.id, "knowledge base updated");
    let owner = load_user(&state.db, auth_user.user_id).await?;
    let stats = stats_for(&state.db, kb.id).await?;
    Ok(Json(KnowledgeBaseResponse::build(
        kb,
        Some(&owner),
        stats,
        true,
        false,
        &state.config.server.kb_share_page_url,
    )))
}

/// Soft-delete a knowledge base.
#[utoipa::path(
    delete,
    path = "/{uid}",
    tag = "Knowledge Bases",
    operation_id = "deleteKnowledgeBase",
    summary = "Delete a knowledge base",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    responses(
        (status = 204, description = "Knowledge base deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn delete_kb(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, AppError> {
    let kb = find_owned_kb(&state.db, &uid, auth_user.user_id).await?;

    knowledge_base::ActiveModel {
        id: Set(kb.id),
        is_deleted: Set(true),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(&state.db)
    .await?;

    info!(kb_id = kb.id, "knowledge base deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// List the caller's knowledge bases.
#[utoipa::path(
    get,
    path = "",
    tag = "Knowledge Bases",
    operation_id = "listOwnKnowledgeBases",
    summary = "List own knowledge bases",
    params(PageQuery),
    responses(
        (status = 200, description = "Own knowledge bases, newest first", body = KnowledgeBaseListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_own_kbs(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<KnowledgeBaseListResponse>, AppError> {
    let base = knowledge_base::Entity::find()
        .filter(knowledge_base::Column::UserId.eq(auth_user.user_id))
        .filter(knowledge_base::Column::IsDeleted.eq(false));

    let total = base.clone().count(&state.db).await?;
    let kbs = base
        .order_by_desc(knowledge_base::Column::CreatedAt)
        .offset(query.offset)
        .limit(query.clamped_limit())
        .all(&state.db)
        .await?;

    let knowledge_bases = build_kb_responses(&state, kbs, auth_user.user_id).await?;
    Ok(Json(KnowledgeBaseListResponse {
        knowledge_bases,
        total,
    }))
}

/// Explore other users' public knowledge bases.
#[utoipa::path(
    get,
    path = "/others",
    tag = "Knowledge Bases",
    operation_id = "exploreKnowledgeBases",
    summary = "Explore other users' public knowledge bases",
    params(PageQuery),
    responses(
        (status = 200, description = "Public knowledge bases of other users", body = KnowledgeBaseListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_others_kbs(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<KnowledgeBaseListResponse>, AppError> {
    let base = knowledge_base::Entity::find()
        .filter(knowledge_base::Column::Visibility.eq(KbVisibility::Public))
        .filter(knowledge_base::Column::UserId.ne(auth_user.user_id))
        .filter(knowledge_base::Column::IsDeleted.eq(false));

    let total = base.clone().count(&state.db).await?;
    let kbs = base
        .order_by_desc(knowledge_base::Column::CreatedAt)
        .offset(query.offset)
        .limit(query.clamped_limit())
        .all(&state.db)
        .await?;

    let knowledge_bases = build_kb_responses(&state, kbs, auth_user.user_id).await?;
    Ok(Json(KnowledgeBaseListResponse {
        knowledge_bases,
        total,
    }))
}

/// List the caller's subscriptions.
#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "Knowledge Bases",
    operation_id = "listSubscribedKnowledgeBases",
    summary = "List subscribed knowledge bases",
    description = "Bases the caller subscribes to, most recently subscribed first.",
    params(PageQuery),
    responses(
        (status = 200, description = "Subscribed knowledge bases", body = KnowledgeBaseListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_subscriptions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<KnowledgeBaseListResponse>, AppError> {
    let base = kb_subscription::Entity::find()
        .filter(kb_subscription::Column::UserId.eq(auth_user.user_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .find_also_related(knowledge_base::Entity)
        .filter(knowledge_base::Column::IsDeleted.eq(false));

    let total = base.clone().count(&state.db).await?;
    let pairs = base
        .order_by_desc(kb_subscription::Column::CreatedAt)
        .offset(query.offset)
        .limit(query.clamped_limit())
        .all(&state.db)
        .await?;

    let kbs: Vec<knowledge_base::Model> = pairs.into_iter().filter_map(|(_, kb)| kb).collect();
    let knowledge_bases = build_kb_responses(&state, kbs, auth_user.user_id).await?;
    Ok(Json(KnowledgeBaseListResponse {
        knowledge_bases,
        total,
    }))
}

/// Fetch one knowledge base.
#[utoipa::path(
    get,
    path = "/{uid}",
    tag = "Knowledge Bases",
    operation_id = "getKnowledgeBase",
    summary = "Fetch one knowledge base",
    description = "Public and default bases are visible to everyone; private and restricted \
        ones only to their owner.",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    responses(
        (status = 200, description = "Knowledge base detail", body = KnowledgeBaseResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or not accessible (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn get_kb(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<KnowledgeBaseResponse>, AppError> {
    let kb = find_visible_kb(&state.db, &uid, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found or not accessible".into()))?;

    let owner = load_user(&state.db, kb.user_id).await?;
    let stats = stats_for(&state.db, kb.id).await?;
    let subscribed = is_subscribed(&state.db, kb.id, auth_user.user_id).await?;
    let owned = kb.user_id == auth_user.user_id;

    Ok(Json(KnowledgeBaseResponse::build(
        kb,
        Some(&owner),
        stats,
        owned,
        subscribed,
        &state.config.server.kb_share_page_url,
    )))
}

/// Attach contents to a knowledge base.
#[utoipa::path(
    post,
    path = "/{uid}/contents",
    tag = "Knowledge Bases",
    operation_id = "addContentsToKnowledgeBase",
    summary = "Attach contents to a knowledge base",
    description = "Links the caller's contents into the base. Previously removed links are \
        restored. `added` counts the uids that matched an existing content of the caller.",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    request_body = AddContentsRequest,
    responses(
        (status = 200, description = "Attach outcome", body = AddContentsResponse),
        (status = 400, description = "Bad uid list (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn add_contents(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    AppJson(payload): AppJson<AddContentsRequest>,
) -> Result<Json<AddContentsResponse>, AppError> {
    let kb = find_owned_kb(&state.db, &uid, auth_user.user_id).await?;
    validate_uid_list(&payload.content_uids, "content uids", 100)?;

    let contents = content::Entity::find()
        .filter(content::Column::Uid.is_in(payload.content_uids.clone()))
        .filter(content::Column::UserId.eq(auth_user.user_id))
        .filter(content::Column::IsDeleted.eq(false))
        .all(&state.db)
        .await?;
    let content_ids: Vec<i32> = contents.iter().map(|c| c.id).collect();

    let added = content_ids.len();
    if !content_ids.is_empty() {
        // Soft-deleted links are restored instead of duplicated.
        let existing: HashMap<i32, content_kb_mapping::Model> = content_kb_mapping::Entity::find()
            .filter(content_kb_mapping::Column::ContentId.is_in(content_ids.clone()))
            .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb.id))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|m| (m.content_id, m))
            .collect();

        for content_id in &content_ids {
            match existing.get(content_id) {
                Some(mapping) if mapping.is_deleted => {
                    content_kb_mapping::ActiveModel {
                        id: Set(mapping.id),
                        is_deleted: Set(false),
                        deleted_at: Set(None),
                        deleted_by: Set(None),
                        created_by: Set(auth_user.user_id),
                        ..Default::default()
                    }
                    .update(&state.db)
                    .await?;
                }
                Some(_) => {}
                None => {
                    content_kb_mapping::ActiveModel {
                        content_id: Set(*content_id),
                        knowledge_base_id: Set(kb.id),
                        created_by: Set(auth_user.user_id),
                        is_deleted: Set(false),
                        created_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(&state.db)
                    .await?;
                }
            }
        }

        touch_kb(&state.db, kb.id).await?;
    }

    info!(kb_id = kb.id, added, "contents attached");
    Ok(Json(AddContentsResponse {
        total: payload.content_uids.len(),
        added,
    }))
}

/// Detach one content from a knowledge base.
#[utoipa::path(
    delete,
    path = "/{uid}/contents/{content_uid}",
    tag = "Knowledge Bases",
    operation_id = "removeContentFromKnowledgeBase",
    summary = "Detach one content from a knowledge base",
    params(
        ("uid" = String, Path, description = "Knowledge base uid"),
        ("content_uid" = String, Path, description = "Content uid"),
    ),
    responses(
        (status = 204, description = "Content detached"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Base, content or link not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn remove_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((uid, content_uid)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let kb = find_owned_kb(&state.db, &uid, auth_user.user_id).await?;
    let content = find_active_by_uid(&state.db, &content_uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;

    let mapping = content_kb_mapping::Entity::find()
        .filter(content_kb_mapping::Column::ContentId.eq(content.id))
        .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb.id))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Content is not in this knowledge base".into()))?;

    content_kb_mapping::ActiveModel {
        id: Set(mapping.id),
        is_deleted: Set(true),
        deleted_at: Set(Some(Utc::now())),
        deleted_by: Set(Some(auth_user.user_id)),
        ..Default::default()
    }
    .update(&state.db)
    .await?;
    touch_kb(&state.db, kb.id).await?;

    info!(kb_id = kb.id, content_id = content.id, "content detached");
    Ok(StatusCode::NO_CONTENT)
}

/// List contents in a knowledge base.
#[utoipa::path(
    get,
    path = "/{uid}/contents",
    tag = "Knowledge Bases",
    operation_id = "listKnowledgeBaseContents",
    summary = "List contents in a knowledge base",
    description = "Summaries of linked contents, most recently linked first.",
    params(
        ("uid" = String, Path, description = "Knowledge base uid"),
        PageQuery,
    ),
    responses(
        (status = 200, description = "Page of content summaries", body = Page<ContentResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or not accessible (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_kb_contents(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ContentResponse>>, AppError> {
    let kb = find_visible_kb(&state.db, &uid, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found or not accessible".into()))?;

    let base = content_kb_mapping::Entity::find()
        .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb.id))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .find_also_related(content::Entity)
        .filter(content::Column::IsDeleted.eq(false));

    let total = base.clone().count(&state.db).await?;
    let pairs = base
        .order_by_desc(content_kb_mapping::Column::CreatedAt)
        .offset(query.offset)
        .limit(query.clamped_limit())
        .all(&state.db)
        .await?;

    let items = pairs
        .into_iter()
        .filter_map(|(_, content)| content)
        .map(|model| {
            let owned = model.user_id == auth_user.user_id;
            let file_url = model
                .file_name_in_storage
                .as_deref()
                .map(|uri| state.storage.get_url(uri));
            let ctx = ResponseContext {
                owned,
                file_url,
                content_page_url: &state.config.server.content_page_url,
                belonged_kbs: None,
            };
            ContentResponse::list_view(model, ctx)
        })
        .collect();

    Ok(Json(Page { items, total }))
}

/// List the caller's contents that can be attached.
#[utoipa::path(
    get,
    path = "/{uid}/available-contents",
    tag = "Knowledge Bases",
    operation_id = "listAvailableContents",
    summary = "List contents available for attaching",
    description = "The caller's completed contents, flagged with whether each one is \
        already in the base.",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    responses(
        (status = 200, description = "Attachable contents", body = Vec<AvailableContentItem>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Knowledge base not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn available_contents(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<AvailableContentItem>>, AppError> {
    let kb = find_owned_kb(&state.db, &uid, auth_user.user_id).await?;

    let in_kb: HashSet<i32> = content_kb_mapping::Entity::find()
        .select_only()
        .column(content_kb_mapping::Column::ContentId)
        .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb.id))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .into_tuple::<i32>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    let contents = content::Entity::find()
        .filter(content::Column::UserId.eq(auth_user.user_id))
        .filter(content::Column::ProcessingStatus.eq(ProcessingStatus::Completed))
        .filter(content::Column::IsDeleted.eq(false))
        .order_by_desc(content::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let items = contents
        .into_iter()
        .map(|content| AvailableContentItem {
            in_knowledge_base: in_kb.contains(&content.id),
            uid: content.uid,
            title: content.title,
            media_type: content.media_type,
        })
        .collect();

    Ok(Json(items))
}

/// Subscribe to a knowledge base.
#[utoipa::path(
    post,
    path = "/{uid}/subscribe",
    tag = "Knowledge Bases",
    operation_id = "subscribeKnowledgeBase",
    summary = "Subscribe to a knowledge base",
    description = "Only other users' shared bases can be subscribed to. Subscribing again \
        while already subscribed is a no-op.",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    responses(
        (status = 204, description = "Subscribed"),
        (status = 400, description = "Own base (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or not accessible (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn subscribe(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, AppError> {
    let kb = find_visible_kb(&state.db, &uid, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found or not accessible".into()))?;

    if kb.user_id == auth_user.user_id {
        return Err(AppError::Validation(
            "You cannot subscribe to your own knowledge base".into(),
        ));
    }

    let existing = kb_subscription::Entity::find()
        .filter(kb_subscription::Column::KnowledgeBaseId.eq(kb.id))
        .filter(kb_subscription::Column::UserId.eq(auth_user.user_id))
        .one(&state.db)
        .await?;

    match existing {
        Some(sub) if !sub.is_deleted => {}
        Some(sub) => {
            kb_subscription::ActiveModel {
                id: Set(sub.id),
                is_deleted: Set(false),
                updated_at: Set(Utc::now()),
                ..Default::default()
            }
            .update(&state.db)
            .await?;
            info!(kb_id = kb.id, "subscription restored");
        }
        None => {
            let now = Utc::now();
            kb_subscription::ActiveModel {
                user_id: Set(auth_user.user_id),
                knowledge_base_id: Set(kb.id),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&state.db)
            .await?;
            info!(kb_id = kb.id, "subscription created");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a subscription.
#[utoipa::path(
    delete,
    path = "/{uid}/subscribe",
    tag = "Knowledge Bases",
    operation_id = "unsubscribeKnowledgeBase",
    summary = "Cancel a subscription",
    params(("uid" = String, Path, description = "Knowledge base uid")),
    responses(
        (status = 204, description = "Unsubscribed"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Base or subscription not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn unsubscribe(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, AppError> {
    let kb = knowledge_base::Entity::find()
        .filter(knowledge_base::Column::Uid.eq(&uid))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found".into()))?;

    let sub = kb_subscription::Entity::find()
        .filter(kb_subscription::Column::KnowledgeBaseId.eq(kb.id))
        .filter(kb_subscription::Column::UserId.eq(auth_user.user_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Not subscribed to this knowledge base".into()))?;

    kb_subscription::ActiveModel {
        id: Set(sub.id),
        is_deleted: Set(true),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(&state.db)
    .await?;

    info!(kb_id = kb.id, "subscription cancelled");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_owned_kb(
    db: &DatabaseConnection,
    uid: &str,
    user_id: i32,
) -> Result<knowledge_base::Model, AppError> {
    knowledge_base::Entity::find()
        .filter(knowledge_base::Column::Uid.eq(uid))
        .filter(knowledge_base::Column::UserId.eq(user_id))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Knowledge base not found".into()))
}

/// A base is visible when it is shared or the viewer owns it.
pub(crate) async fn find_visible_kb(
    db: &DatabaseConnection,
    uid: &str,
    viewer_id: i32,
) -> Result<Option<knowledge_base::Model>, DbErr> {
    let Some(kb) = knowledge_base::Entity::find()
        .filter(knowledge_base::Column::Uid.eq(uid))
        .filter(knowledge_base::Column::IsDeleted.eq(false))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    if kb.visibility.is_shared() || kb.user_id == viewer_id {
        Ok(Some(kb))
    } else {
        Ok(None)
    }
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

async fn load_user(db: &DatabaseConnection, user_id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn active_subscriber_count(db: &DatabaseConnection, kb_id: i32) -> Result<u64, DbErr> {
    kb_subscription::Entity::find()
        .filter(kb_subscription::Column::KnowledgeBaseId.eq(kb_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .count(db)
        .await
}

/// Content count skips links whose content was deleted afterwards.
async fn stats_for(db: &DatabaseConnection, kb_id: i32) -> Result<KbStats, DbErr> {
    let subscriber_count = active_subscriber_count(db, kb_id).await?;
    let content_count = content_kb_mapping::Entity::find()
        .join(JoinType::InnerJoin, content_kb_mapping::Relation::Content.def())
        .filter(content_kb_mapping::Column::KnowledgeBaseId.eq(kb_id))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .filter(content::Column::IsDeleted.eq(false))
        .count(db)
        .await?;
    Ok(KbStats {
        subscriber_count,
        content_count,
    })
}

async fn is_subscribed(db: &DatabaseConnection, kb_id: i32, user_id: i32) -> Result<bool, DbErr> {
    let count = kb_subscription::Entity::find()
        .filter(kb_subscription::Column::KnowledgeBaseId.eq(kb_id))
        .filter(kb_subscription::Column::UserId.eq(user_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .count(db)
        .await?;
    Ok(count > 0)
}

async fn touch_kb(db: &DatabaseConnection, kb_id: i32) -> Result<(), DbErr> {
    knowledge_base::ActiveModel {
        id: Set(kb_id),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

/// Shape a page of bases, loading stats, owners and subscription flags in
/// batch queries instead of per row.
async fn build_kb_responses(
    state: &AppState,
    kbs: Vec<knowledge_base::Model>,
    viewer_id: i32,
) -> Result<Vec<KnowledgeBaseResponse>, AppError> {
    if kbs.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = kbs.iter().map(|kb| kb.id).collect();

    let sub_counts: Vec<(i32, i64)> = kb_subscription::Entity::find()
        .select_only()
        .column(kb_subscription::Column::KnowledgeBaseId)
        .column_as(kb_subscription::Column::Id.count(), "count")
        .filter(kb_subscription::Column::KnowledgeBaseId.is_in(ids.clone()))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .group_by(kb_subscription::Column::KnowledgeBaseId)
        .into_tuple()
        .all(&state.db)
        .await?;

    let content_counts: Vec<(i32, i64)> = content_kb_mapping::Entity::find()
        .select_only()
        .column(content_kb_mapping::Column::KnowledgeBaseId)
        .column_as(content_kb_mapping::Column::Id.count(), "count")
        .join(JoinType::InnerJoin, content_kb_mapping::Relation::Content.def())
        .filter(content_kb_mapping::Column::KnowledgeBaseId.is_in(ids.clone()))
        .filter(content_kb_mapping::Column::IsDeleted.eq(false))
        .filter(content::Column::IsDeleted.eq(false))
        .group_by(content_kb_mapping::Column::KnowledgeBaseId)
        .into_tuple()
        .all(&state.db)
        .await?;

    let subscribed: HashSet<i32> = kb_subscription::Entity::find()
        .select_only()
        .column(kb_subscription::Column::KnowledgeBaseId)
        .filter(kb_subscription::Column::KnowledgeBaseId.is_in(ids))
        .filter(kb_subscription::Column::UserId.eq(viewer_id))
        .filter(kb_subscription::Column::IsDeleted.eq(false))
        .into_tuple::<i32>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    let owner_ids: HashSet<i32> = kbs.iter().map(|kb| kb.user_id).collect();
    let owners: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(owner_ids))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut stats: HashMap<i32, KbStats> = HashMap::new();
    for (kb_id, count) in sub_counts {
        stats.entry(kb_id).or_default().subscriber_count = count.max(0) as u64;
    }
    for (kb_id, count) in content_counts {
        stats.entry(kb_id).or_default().content_count = count.max(0) as u64;
    }

    Ok(kbs
        .into_iter()
        .map(|kb| {
            let kb_stats = stats.get(&kb.id).copied().unwrap_or_default();
            let is_subscribed = subscribed.contains(&kb.id);
            let owned = kb.user_id == viewer_id;
            let owner = owners.get(&kb.user_id);
            KnowledgeBaseResponse::build(
                kb,
                owner,
                kb_stats,
                owned,
                is_subscribed,
                &state.config.server.kb_share_page_url,
            )
        })
        .collect())
}
