use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Offset/limit query parameters for list endpoints.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    /// Number of items to skip.
    #[serde(default)]
    pub offset: u64,
    /// Page size (1-100).
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    20
}

impl PageQuery {
    pub fn clamped_limit(&self) -> u64 {
        self.limit.clamp(1, 100)
    }
}

/// List page with offset pagination metadata.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Page<T: utoipa::ToSchema> {
    pub items: Vec<T>,
    /// Total number of matching items.
    #[schema(example = 47)]
    pub total: u64,
}

/// List page for cursor pagination. `next_cursor` is absent on the last page.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CursorPage<T: utoipa::ToSchema> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Escape LIKE wildcard characters in a search string.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Serde helper for PATCH semantics on nullable fields.
///
/// * JSON field absent  => `None`          (don't update)
/// * JSON field = null  => `Some(None)`    (set to NULL)
/// * JSON field = value => `Some(Some(v))` (set to value)
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Validate a trimmed display name (1-256 Unicode characters).
pub fn validate_name(name: &str, what: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 256 {
        return Err(AppError::Validation(format!(
            "{what} must be 1-256 characters"
        )));
    }
    Ok(())
}

/// Validate an absolute http(s) URL.
pub fn validate_url(raw: &str) -> Result<url::Url, AppError> {
    let parsed = url::Url::parse(raw).map_err(|_| AppError::Validation("Invalid URL".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation("Invalid URL".into()));
    }
    Ok(parsed)
}

/// Validate a uid list for bulk operations (non-empty, no duplicates, max length).
pub fn validate_uid_list(uids: &[String], name: &str, max: usize) -> Result<(), AppError> {
    if uids.is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }
    if uids.len() > max {
        return Err(AppError::Validation(format!("Too many {name}: max {max}")));
    }
    let mut seen = HashSet::new();
    for uid in uids {
        if !seen.insert(uid.as_str()) {
            return Err(AppError::Validation(format!("Duplicate {name}: {uid}")));
        }
    }
    Ok(())
}

/// Fresh opaque identifier for API-facing rows.
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
