use chrono::NaiveDateTime;
use common::{MediaType, ProcessingStatus, RagStatus, SubtitleSegment};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::entity::content;

/// Request body for creating content from a URL.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateContentRequest {
    /// Source URL to ingest.
    #[schema(example = "https://www.youtube.com/watch?v=dQw4w9WgXcQ")]
    pub url: String,
    /// Optional knowledge base to file the content under.
    pub kb_uid: Option<String>,
}

/// One placeholder in a batch create call.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct BatchItem {
    pub media_type: MediaType,
    /// Client-side file name; becomes the row's initial title.
    pub file_name: String,
    /// Optional knowledge base to file the content under.
    pub kb_uid: Option<String>,
}

/// Request body for batch placeholder creation.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct BatchCreateRequest {
    pub items: Vec<BatchItem>,
}

/// One created placeholder reported back to the client.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BatchCreatedItem {
    pub uid: String,
    pub media_type: MediaType,
    pub file_name: String,
    pub status: ProcessingStatus,
}

/// Response for batch placeholder creation.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BatchCreateResponse {
    pub batch_id: String,
    pub items: Vec<BatchCreatedItem>,
}

/// Query parameters for the cursor-paginated content list.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ContentListQuery {
    /// Uid of the last item of the previous page.
    pub cursor: Option<String>,
    /// Page size (1-200).
    #[serde(default = "default_list_limit")]
    pub limit: u64,
}

fn default_list_limit() -> u64 {
    100
}

/// Request body for fetching multiple contents by uid.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ContentUidsRequest {
    pub uids: Vec<String>,
}

/// Per-user audio transcription budget.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AudioQuotaResponse {
    /// Seconds of audio already transcribed.
    pub used_seconds: f64,
    /// Account-wide budget in seconds.
    pub limit_seconds: f64,
    /// Whether another audio upload is currently allowed.
    pub allowed: bool,
}

/// Response for view/share counting endpoints.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PageUrlResponse {
    pub page_url: String,
}

/// Knowledge base reference embedded in content responses.
#[derive(Serialize, utoipa::ToSchema)]
pub struct KbBrief {
    pub uid: String,
    pub name: String,
}

/// Extra inputs for shaping a content row into an API response.
pub struct ResponseContext<'a> {
    pub owned: bool,
    /// Public URL of the stored file, when one exists.
    pub file_url: Option<String>,
    /// Base URL of the public content page.
    pub content_page_url: &'a str,
    pub belonged_kbs: Option<Vec<KbBrief>>,
}

/// Full content representation returned by detail endpoints. List views
/// reuse the same shape with the heavy fields cleared.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ContentResponse {
    pub uid: String,
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub author: Option<String>,
    pub lang: Option<String>,
    pub published_time: Option<NaiveDateTime>,
    pub cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub source: Option<String>,
    pub processing_status: ProcessingStatus,
    pub rag_status: RagStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub page_url: String,
    pub view_count: i32,
    pub share_count: i32,
    pub ai_mermaid: Option<String>,
    pub ai_structure: Option<String>,
    pub ai_recommend_reason: Option<String>,
    pub ai_summary: Option<String>,
    pub text_content: Option<String>,
    pub ai_tags: Option<Vec<String>>,
    pub media_type: MediaType,
    pub media_subtitles: Vec<SubtitleSegment>,
    pub video_embed_html: Option<String>,
    pub file_url: Option<String>,
    pub image_ocr: Option<String>,
    pub shownotes: Option<String>,
    pub belonged_kbs: Option<Vec<KbBrief>>,
    pub owned: bool,
}

impl ContentResponse {
    /// Detail view: every stored field plus the derived ones.
    pub fn from_model(model: content::Model, ctx: ResponseContext<'_>) -> Self {
        let description = derive_description(&model);
        let shownotes = derive_shownotes(&model);
        let subtitles = parse_subtitles(model.media_subtitles.as_ref());
        let tags = parse_tags(model.ai_tags.as_ref());
        let images = parse_images(model.images.as_ref());

        Self {
            page_url: page_url(ctx.content_page_url, &model.uid),
            video_embed_html: video_embed_html(model.video_embed_url.as_deref()),
            processing_status: presented_status(model.processing_status),
            description,
            shownotes,
            uid: model.uid,
            title: model.title,
            site_name: model.site_name,
            author: model.author,
            lang: model.lang,
            published_time: model.published_time,
            cover: model.cover,
            images,
            source: model.source,
            rag_status: model.rag_status,
            created_at: model.created_at,
            content: model.content,
            view_count: model.view_count,
            share_count: model.share_count,
            ai_mermaid: model.ai_mermaid,
            ai_structure: model.ai_structure,
            ai_recommend_reason: model.ai_recommend_reason,
            ai_summary: model.ai_summary,
            text_content: model.text_content,
            ai_tags: tags,
            media_type: model.media_type,
            media_subtitles: subtitles,
            file_url: ctx.file_url,
            image_ocr: model.image_ocr,
            belonged_kbs: ctx.belonged_kbs,
            owned: ctx.owned,
        }
    }

    /// List view: the heavy fields are dropped to keep pages small.
    pub fn list_view(model: content::Model, ctx: ResponseContext<'_>) -> Self {
        let mut response = Self::from_model(model, ctx);
        response.content = None;
        response.ai_mermaid = None;
        response.ai_structure = None;
        response.media_subtitles = Vec::new();
        response.text_content = None;
        response
    }
}

/// Public page URL for a content uid.
pub fn page_url(content_page_url: &str, uid: &str) -> String {
    format!("{}/{}", content_page_url.trim_end_matches('/'), uid)
}

/// Placeholders are shown as PENDING; WAITING_INIT is an internal state.
pub fn presented_status(status: ProcessingStatus) -> ProcessingStatus {
    if status == ProcessingStatus::WaitingInit {
        ProcessingStatus::Pending
    } else {
        status
    }
}

fn hook_regex() -> &'static Regex {
    static HOOK: OnceLock<Regex> = OnceLock::new();
    HOOK.get_or_init(|| {
        Regex::new(r"### \*\*One-Sentence Hook\*\*\s*\n+([\s\S]+?)\n+\s*### \*\*Key Points\*\*")
            .unwrap_or_else(|e| panic!("hook regex: {e}"))
    })
}

/// Pull the one-sentence hook section out of a generated summary, falling
/// back to the whole text when the section markers are missing.
pub fn extract_one_sentence_hook(text: &str) -> String {
    if let Some(captures) = hook_regex().captures(text) {
        if let Some(section) = captures.get(1) {
            let section = section.as_str().trim();
            if !section.is_empty() {
                return section.to_owned();
            }
        }
    }
    text.to_owned()
}

/// Short description shown in list cards. Videos reuse their raw
/// description; everything else derives from the generated summary.
pub fn derive_description(model: &content::Model) -> Option<String> {
    if model.media_type == MediaType::Video {
        if let Some(raw) = &model.raw_description {
            return Some(raw.replace('\n', ""));
        }
    }
    model
        .ai_summary
        .as_deref()
        .map(extract_one_sentence_hook)
}

fn derive_shownotes(model: &content::Model) -> Option<String> {
    if matches!(model.media_type, MediaType::Video | MediaType::SpotifyAudio) {
        model.raw_description.clone()
    } else {
        None
    }
}

/// Embed iframe for video content, or `None` when there is no embed URL.
pub fn video_embed_html(video_embed_url: Option<&str>) -> Option<String> {
    let url = video_embed_url?;
    let embed_url = if url.contains('?') {
        format!("{url}&enablejsapi=1")
    } else {
        format!("{url}?enablejsapi=1")
    };
    Some(format!(
        "<iframe width=\"100%\" height=\"221\" src=\"{embed_url}\" frameborder=\"0\" \
         allow=\"accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; \
         picture-in-picture; web-share\" referrerpolicy=\"strict-origin-when-cross-origin\"></iframe>"
    ))
}

pub(crate) fn parse_subtitles(value: Option<&serde_json::Value>) -> Vec<SubtitleSegment> {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn parse_tags(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn parse_images(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}
