use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, error_for_status};
use crate::retry::{RetryPolicy, with_retries};

const API_BASE: &str = "https://twitter-api45.p.rapidapi.com";
const RAPIDAPI_HOST: &str = "twitter-api45.p.rapidapi.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);

/// Extracts the tweet id from a twitter.com or x.com status URL.
pub fn parse_tweet_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host != "twitter.com" && host != "x.com" {
        return None;
    }
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    if segments.len() >= 3
        && segments[1] == "status"
        && !segments[2].is_empty()
        && segments[2].bytes().all(|b| b.is_ascii_digit())
    {
        return Some(segments[2].to_owned());
    }
    None
}

/// Parses the classic twitter timestamp format, falling back to RFC 3339.
pub fn parse_created_at(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
        return Some(parsed.naive_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.naive_utc())
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetAuthor {
    pub name: String,
    pub screen_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetPhoto {
    pub media_url_https: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoVariant {
    pub content_type: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub bitrate: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoDimensions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetVideo {
    #[serde(default)]
    pub variants: Vec<VideoVariant>,
    pub original_info: Option<VideoDimensions>,
    /// Poster frame for the video.
    pub media_url_https: Option<String>,
}

impl TweetVideo {
    /// The highest-bitrate MP4 rendition, if any.
    pub fn best_mp4(&self) -> Option<&VideoVariant> {
        self.variants
            .iter()
            .filter(|variant| {
                variant.content_type.as_deref() == Some("video/mp4") && variant.url.is_some()
            })
            .max_by_key(|variant| variant.bitrate)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetMedia {
    pub photo: Option<Vec<TweetPhoto>>,
    pub video: Option<Vec<TweetVideo>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadTweet {
    pub author: TweetAuthor,
    pub display_text: Option<String>,
    pub media: Option<TweetMedia>,
}

/// A tweet with its same-author follow-ups.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetThread {
    pub author: TweetAuthor,
    pub display_text: Option<String>,
    pub text: Option<String>,
    pub lang: Option<String>,
    pub created_at: Option<String>,
    pub media: Option<TweetMedia>,
    pub thread: Option<Vec<ThreadTweet>>,
}

/// Client for the RapidAPI twitter thread service.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TwitterClient {
    pub fn new(api_key: &str) -> Result<Self, ClientError> {
        Self::with_base(api_key, API_BASE)
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(
        api_key: &str,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let mut client = Self::with_base(api_key, base_url)?;
        client.retry = RetryPolicy::new(RETRY.tries, Duration::from_millis(1), 1.0);
        Ok(client)
    }

    fn with_base(api_key: &str, base_url: impl Into<String>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-rapidapi-host", HeaderValue::from_static(RAPIDAPI_HOST));
        headers.insert(
            "x-rapidapi-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| ClientError::Config("invalid rapidapi key".into()))?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry: RETRY,
        })
    }

    /// Fetches a tweet and its thread by id.
    pub async fn thread(&self, tweet_id: &str) -> Result<TweetThread, ClientError> {
        with_retries(self.retry, "twitter thread", || self.thread_once(tweet_id)).await
    }

    async fn thread_once(&self, tweet_id: &str) -> Result<TweetThread, ClientError> {
        let response = self
            .http
            .get(format!("{}/tweet_thread.php", self.base_url))
            .query(&[("id", tweet_id)])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }
}
