use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, error_for_status};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts the video id from a YouTube watch or short-form URL.
///
/// Understands `youtube.com/watch?v=` style links and `youtu.be/<id>`
/// redirects. Returns `None` for anything else.
pub fn parse_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host == "youtu.be" || host.ends_with(".youtu.be") {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned);
    }
    if host == "youtube.com" || host.ends_with(".youtube.com") {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());
    }
    None
}

/// Parses an ISO 8601 duration such as `PT1H2M3S` into seconds.
///
/// Supports week, day, hour, minute and second components, which covers
/// everything the Data API emits. Calendar units would be ambiguous and
/// yield `None`.
pub fn parse_iso8601_duration(value: &str) -> Option<f64> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let mut seconds = 0.0;
    for (number, unit) in duration_components(date_part)? {
        seconds += match unit {
            'W' => number * 604_800.0,
            'D' => number * 86_400.0,
            _ => return None,
        };
    }
    for (number, unit) in duration_components(time_part)? {
        seconds += match unit {
            'H' => number * 3_600.0,
            'M' => number * 60.0,
            'S' => number,
            _ => return None,
        };
    }
    Some(seconds)
}

fn duration_components(part: &str) -> Option<Vec<(f64, char)>> {
    let mut components = Vec::new();
    let mut buffer = String::new();
    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            buffer.push(ch);
        } else if ch.is_ascii_uppercase() && !buffer.is_empty() {
            components.push((buffer.parse().ok()?, ch));
            buffer.clear();
        } else {
            return None;
        }
    }
    if buffer.is_empty() { Some(components) } else { None }
}

/// Metadata for a single YouTube video.
#[derive(Debug, Clone)]
pub struct YouTubeVideo {
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub duration_seconds: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub embed_url: String,
    pub default_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: Option<VideoSnippet>,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: Option<String>,
    channel_title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    default_language: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

/// Client for the YouTube Data API v3.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_base(api_key, API_BASE)
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_base(api_key, base_url)
    }

    fn with_base(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// Looks up a video, returning `None` when the id does not resolve.
    pub async fn video_info(&self, video_id: &str) -> Result<Option<YouTubeVideo>, ClientError> {
        let response = self
            .http
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let listing: VideoListResponse = response.json().await?;

        let Some(item) = listing.items.into_iter().next() else {
            return Ok(None);
        };
        let snippet = item.snippet.unwrap_or_else(|| VideoSnippet {
            title: None,
            channel_title: None,
            description: None,
            published_at: None,
            default_language: None,
            thumbnails: None,
        });

        let duration_seconds = item
            .content_details
            .and_then(|details| details.duration)
            .and_then(|raw| parse_iso8601_duration(&raw));
        let published_at = snippet
            .published_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.naive_utc());

        Ok(Some(YouTubeVideo {
            title: snippet.title,
            channel_title: snippet.channel_title,
            description: snippet.description,
            published_at,
            duration_seconds,
            thumbnail_url: snippet
                .thumbnails
                .and_then(|thumbs| thumbs.high)
                .and_then(|thumb| thumb.url),
            embed_url: format!("https://www.youtube.com/embed/{video_id}"),
            default_language: snippet.default_language,
        }))
    }
}
