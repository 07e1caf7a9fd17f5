use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use tracing::{info, instrument};

use crate::entity::{annotation, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::content::find_active_by_uid;
use crate::models::annotation::{
    AnnotationResponse, AnnotationsResponse, CreateAnnotationRequest, UpdateAnnotationRequest,
    validate_annotation_content,
};
use crate::state::AppState;

/// Create an annotation on a content.
#[utoipa::path(
    post,
    path = "",
    tag = "Annotations",
    operation_id = "createAnnotation",
    summary = "Create an annotation",
    description = "Anchors a W3C Web Annotation to a content. The annotation uid is chosen \
        by the client.",
    request_body = CreateAnnotationRequest,
    responses(
        (status = 201, description = "Annotation created", body = AnnotationResponse),
        (status = 400, description = "Malformed annotation (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Content not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Annotation uid already exists (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn create_annotation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateAnnotationRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_annotation_content(&payload.annotation_content)?;
    if payload.uid.trim().is_empty() {
        return Err(AppError::Validation("Annotation uid must not be empty".into()));
    }

    let content = find_active_by_uid(&state.db, &payload.content_uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;

    let now = Utc::now();
    let annotation = annotation::ActiveModel {
        uid: Set(payload.uid),
        user_id: Set(auth_user.user_id),
        target_content_id: Set(content.id),
        content: Set(payload.annotation_content),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Annotation uid already exists".into())
        }
        _ => AppError::from(e),
    })?;

    info!(annotation_id = annotation.id, content_id = content.id, "annotation created");
    Ok((StatusCode::CREATED, Json(AnnotationResponse::from(annotation))))
}

/// List a content's annotations.
#[utoipa::path(
    get,
    path = "/{uid}/annotations",
    tag = "Annotations",
    operation_id = "listContentAnnotations",
    summary = "List a content's annotations",
    description = "Every annotation on the content, each with the author's display name, \
        avatar and `create_time` merged into the annotation object. An unknown content uid \
        yields an empty list.",
    params(("uid" = String, Path, description = "Content uid")),
    responses(
        (status = 200, description = "Annotations with author data", body = AnnotationsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_content_annotations(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<AnnotationsResponse>, AppError> {
    let Some(content) = find_active_by_uid(&state.db, &uid).await? else {
        return Ok(Json(AnnotationsResponse {
            content_uid: uid,
            annotations: Vec::new(),
        }));
    };

    let annotations = annotation::Entity::find()
        .filter(annotation::Column::TargetContentId.eq(content.id))
        .filter(annotation::Column::IsDeleted.eq(false))
        .order_by_asc(annotation::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let author_ids: Vec<i32> = annotations.iter().map(|a| a.user_id).collect();
    let authors: HashMap<i32, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(author_ids))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let annotations = annotations
        .into_iter()
        .map(|a| {
            let author = authors.get(&a.user_id);
            merged_annotation(a.content, a.created_at, author)
        })
        .collect();

    Ok(Json(AnnotationsResponse {
        content_uid: uid,
        annotations,
    }))
}

/// Replace an annotation's body.
#[utoipa::path(
    patch,
    path = "/{uid}",
    tag = "Annotations",
    operation_id = "updateAnnotation",
    summary = "Replace an annotation's body",
    description = "The caller must own both the annotation and the content it is anchored \
        to, and the annotation must belong to the content named in the request.",
    params(("uid" = String, Path, description = "Annotation uid")),
    request_body = UpdateAnnotationRequest,
    responses(
        (status = 200, description = "Annotation updated", body = AnnotationResponse),
        (status = 400, description = "Malformed annotation (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Annotation or content not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload))]
pub async fn update_annotation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    AppJson(payload): AppJson<UpdateAnnotationRequest>,
) -> Result<Json<AnnotationResponse>, AppError> {
    validate_annotation_content(&payload.annotation_content)?;

    let content = find_active_by_uid(&state.db, &payload.content_uid)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;
    if content.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }

    let annotation = find_active_annotation(&state, &uid).await?;
    if annotation.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }
    if annotation.target_content_id != content.id {
        return Err(AppError::Validation(
            "Annotation does not belong to the specified content".into(),
        ));
    }

    let annotation = annotation::ActiveModel {
        id: Set(annotation.id),
        content: Set(payload.annotation_content),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(&state.db)
    .await?;

    info!(annotation_id = annotation.id, "annotation updated");
    Ok(Json(AnnotationResponse::from(annotation)))
}

/// Soft-delete an annotation.
#[utoipa::path(
    delete,
    path = "/{uid}",
    tag = "Annotations",
    operation_id = "deleteAnnotation",
    summary = "Delete an annotation",
    description = "The caller must own both the annotation and its target content.",
    params(("uid" = String, Path, description = "Annotation uid")),
    responses(
        (status = 204, description = "Annotation deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the owner (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Annotation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn delete_annotation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, AppError> {
    let annotation = find_active_annotation(&state, &uid).await?;
    if annotation.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }

    let content = crate::entity::content::Entity::find_by_id(annotation.target_content_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Content not found".into()))?;
    if content.user_id != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }

    annotation::ActiveModel {
        id: Set(annotation.id),
        is_deleted: Set(true),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(&state.db)
    .await?;

    info!(annotation_id = annotation.id, "annotation deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_active_annotation(
    state: &AppState,
    uid: &str,
) -> Result<annotation::Model, AppError> {
    annotation::Entity::find()
        .filter(annotation::Column::Uid.eq(uid))
        .filter(annotation::Column::IsDeleted.eq(false))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Annotation not found".into()))
}

/// Author display fields and the creation time ride along inside the
/// annotation object itself.
fn merged_annotation(
    content: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    author: Option<&user::Model>,
) -> serde_json::Value {
    match content {
        serde_json::Value::Object(mut object) => {
            if let Some(author) = author {
                let nickname = author
                    .nickname
                    .clone()
                    .unwrap_or_else(|| author.username.clone());
                object.insert("nickname".into(), serde_json::Value::String(nickname));
                object.insert("avatar".into(), serde_json::json!(author.avatar));
            }
            object.insert(
                "create_time".into(),
                serde_json::Value::String(created_at.to_rfc3339()),
            );
            serde_json::Value::Object(object)
        }
        other => other,
    }
}
