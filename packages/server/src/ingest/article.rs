use chrono::DateTime;
use common::ContentHash;

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

/// Extract a web page through the readability sidecar.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let source = content
        .source
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("article row has no source URL".into()))?;

    let article = state.clients.readability.extract(source).await?;

    let text = article.text_content.unwrap_or_default();
    let content_hash = (!text.is_empty()).then(|| ContentHash::compute(&text).to_hex());

    Ok(Extraction {
        title: article.title,
        author: article.byline,
        site_name: article.site_name,
        lang: article.lang,
        published_time: article
            .published_time
            .as_deref()
            .and_then(parse_published_time),
        cover: article.cover,
        images: article.images,
        content: article.content,
        text_content: Some(text),
        content_hash,
        ..Default::default()
    })
}

/// Pages report publication time in assorted ISO 8601 flavors; unparseable
/// values are dropped rather than failing the extraction.
fn parse_published_time(raw: &str) -> Option<chrono::NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.naive_utc())
        .or_else(|| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
