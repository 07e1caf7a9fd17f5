use std::time::Duration;

use common::SubtitleSegment;
use serde::Deserialize;

use crate::error::{ClientError, error_for_status};

const API_BASE: &str = "https://www.searchapi.io/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    transcripts: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
}

/// Fetches YouTube transcripts through the searchapi.io transcript engine.
#[derive(Debug, Clone)]
pub struct TranscriptClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TranscriptClient {
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

    /// Returns the transcript segments for a video, empty when the video has
    /// no captions in the requested language.
    pub async fn fetch(
        &self,
        video_id: &str,
        lang: Option<&str>,
    ) -> Result<Vec<SubtitleSegment>, ClientError> {
        let mut query = vec![
            ("engine", "youtube_transcripts".to_owned()),
            ("video_id", video_id.to_owned()),
            ("api_key", self.api_key.clone()),
        ];
        if let Some(lang) = lang.filter(|lang| !lang.is_empty()) {
            query.push(("lang", lang.to_owned()));
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&query)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let listing: TranscriptResponse = response.json().await?;

        Ok(listing
            .transcripts
            .into_iter()
            .map(|segment| SubtitleSegment::new(segment.text, segment.start, segment.duration))
            .collect())
    }
}
