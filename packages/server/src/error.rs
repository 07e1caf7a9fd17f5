use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `INVALID_CREDENTIALS`, `PERMISSION_DENIED`, `NOT_FOUND`,
    /// `CONFLICT`, `USERNAME_TAKEN`, `FILE_TOO_LARGE`, `FILE_TYPE_NOT_SUPPORTED`,
    /// `SINGLE_AUDIO_EXCEEDS_DURATION_LIMIT`, `TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT`,
    /// `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Invalid URL")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Authentication required")]
    TokenMissing,
    #[error("Invalid or expired token")]
    TokenInvalid,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Insufficient permissions")]
    PermissionDenied,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("File exceeds the maximum upload size")]
    FileTooLarge,
    #[error("File type is not allowed")]
    UnsupportedFileType,
    #[error("Audio file duration exceeds the single file limit")]
    SingleAudioQuotaExceeded,
    #[error("Total audio duration exceeds the account limit")]
    TotalAudioQuotaExceeded,
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Status line and wire code per variant. Messages come from `Display`.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::TokenMissing => (StatusCode::UNAUTHORIZED, "TOKEN_MISSING"),
            AppError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::UsernameTaken => (StatusCode::CONFLICT, "USERNAME_TAKEN"),
            AppError::FileTooLarge => (StatusCode::BAD_REQUEST, "FILE_TOO_LARGE"),
            AppError::UnsupportedFileType => (StatusCode::BAD_REQUEST, "FILE_TYPE_NOT_SUPPORTED"),
            AppError::SingleAudioQuotaExceeded => {
                (StatusCode::BAD_REQUEST, "SINGLE_AUDIO_EXCEEDS_DURATION_LIMIT")
            }
            AppError::TotalAudioQuotaExceeded => {
                (StatusCode::BAD_REQUEST, "TOTAL_AUDIO_EXCEEDS_DURATION_LIMIT")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            // The detail is for the logs; clients get an opaque message.
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<common::storage::StorageError> for AppError {
    fn from(err: common::storage::StorageError) -> Self {
        match err {
            common::storage::StorageError::NotFound(uri) => {
                AppError::NotFound(format!("File '{uri}' not found"))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
