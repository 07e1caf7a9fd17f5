use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

/// Serve a stored object.
#[utoipa::path(
    get,
    path = "/{*path}",
    tag = "Files",
    operation_id = "serveFile",
    summary = "Serve a stored object",
    description = "Streams an object out of the configured store. File URLs embedded in \
        content responses point here when the local backend is active.",
    params(("path" = String, Path, description = "Object URI, e.g. `uploads/abc123.pdf`")),
    responses(
        (status = 200, description = "Object bytes with a guessed content type"),
        (status = 404, description = "No such object (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Object URIs never navigate upwards.
    if path.split(['/', '\\']).any(|part| part == "..") {
        return Err(AppError::NotFound(format!("File '{path}' not found")));
    }

    let content = state.storage.download(&path).await?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(Body::from(content))
        .map_err(|e| AppError::Internal(e.to_string()))
}
