use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Request body for creating an annotation. The uid is client-supplied so
/// offline-created annotations keep their identity.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateAnnotationRequest {
    pub content_uid: String,
    pub uid: String,
    /// W3C Web Annotation JSON.
    pub annotation_content: serde_json::Value,
}

/// Request body for replacing an annotation's W3C blob.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateAnnotationRequest {
    pub content_uid: String,
    /// W3C Web Annotation JSON.
    pub annotation_content: serde_json::Value,
}

/// Annotation representation returned on create/update.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AnnotationResponse {
    pub uid: String,
    pub target_content_id: i32,
    pub content: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::entity::annotation::Model> for AnnotationResponse {
    fn from(model: crate::entity::annotation::Model) -> Self {
        Self {
            uid: model.uid,
            target_content_id: model.target_content_id,
            content: model.content,
            created_at: model.created_at,
        }
    }
}

/// All annotations for one content, with author display data merged into
/// each annotation object.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AnnotationsResponse {
    pub content_uid: String,
    pub annotations: Vec<serde_json::Value>,
}

/// Validate the W3C annotation envelope: a JSON object carrying at least
/// `type`, `body` and `target`.
pub fn validate_annotation_content(value: &serde_json::Value) -> Result<(), AppError> {
    let Some(object) = value.as_object() else {
        return Err(AppError::Validation(
            "Annotation content must be a JSON object".into(),
        ));
    };
    for key in ["type", "body", "target"] {
        if !object.contains_key(key) {
            return Err(AppError::Validation(format!(
                "Annotation content must contain '{key}'"
            )));
        }
    }
    Ok(())
}
