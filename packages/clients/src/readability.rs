use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, error_for_status};

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(120);

/// Article extraction result from the content parser service.
///
/// Every field is optional because the extractor degrades gracefully on
/// pages it only partially understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArticle {
    #[serde(default)]
    pub title: Option<String>,
    /// Sanitized article body as HTML.
    #[serde(default)]
    pub content: Option<String>,
    /// Plain-text rendition of the body.
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub byline: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    /// Publication timestamp as reported by the page, ISO 8601 when present.
    #[serde(default)]
    pub published_time: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

/// Client for the readability-style content parser sidecar.
#[derive(Debug, Clone)]
pub struct ReadabilityClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReadabilityClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(EXTRACT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Extracts the readable article behind `url`.
    pub async fn extract(&self, url: &str) -> Result<ExtractedArticle, ClientError> {
        tracing::debug!(url, "extracting article");
        let response = self
            .http
            .get(format!("{}/api/extract", self.base_url))
            .query(&[("url", url)])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }
}
