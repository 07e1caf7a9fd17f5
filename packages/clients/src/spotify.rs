use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, error_for_status};
use crate::retry::{RetryPolicy, with_retries};

const API_BASE: &str = "https://spotify23.p.rapidapi.com";
const RAPIDAPI_HOST: &str = "spotify23.p.rapidapi.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(3), 2.0);

/// Extracts the episode id from an open.spotify.com episode URL.
pub fn parse_episode_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host != "spotify.com" && !host.ends_with(".spotify.com") {
        return None;
    }
    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "episode" {
            return segments
                .next()
                .filter(|id| !id.is_empty())
                .map(str::to_owned);
        }
    }
    None
}

/// Maps a download's content type to the file extension used in storage.
///
/// MP4 containers are accepted as audio since podcast CDNs commonly serve
/// audio-only MP4 under a video content type.
pub fn extension_for_audio(content_type: &str) -> Option<&'static str> {
    match content_type.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some(".mp3"),
        "audio/mp4" | "audio/x-m4a" | "video/mp4" | "application/mp4" => Some(".mp4"),
        "audio/aac" => Some(".aac"),
        "audio/ogg" => Some(".ogg"),
        "audio/wav" | "audio/x-wav" => Some(".wav"),
        _ => None,
    }
}

/// Podcast episode metadata.
#[derive(Debug, Clone)]
pub struct SpotifyEpisode {
    pub name: Option<String>,
    pub description: Option<String>,
    pub html_description: Option<String>,
    pub duration_seconds: Option<f64>,
    pub cover_url: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub podcast_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    data: Option<EpisodeData>,
}

#[derive(Debug, Deserialize)]
struct EpisodeData {
    #[serde(rename = "episodeUnionV2")]
    episode: Option<EpisodeUnion>,
}

#[derive(Debug, Deserialize)]
struct EpisodeUnion {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "htmlDescription")]
    html_description: Option<String>,
    duration: Option<EpisodeDuration>,
    #[serde(rename = "coverArt")]
    cover_art: Option<CoverArt>,
    #[serde(rename = "releaseDate")]
    release_date: Option<ReleaseDate>,
    #[serde(rename = "podcastV2")]
    podcast: Option<PodcastWrapper>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDuration {
    #[serde(rename = "totalMilliseconds")]
    total_milliseconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoverArt {
    #[serde(default)]
    sources: Vec<CoverSource>,
}

#[derive(Debug, Deserialize)]
struct CoverSource {
    url: Option<String>,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDate {
    #[serde(rename = "isoString")]
    iso_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodcastWrapper {
    data: Option<PodcastData>,
}

#[derive(Debug, Deserialize)]
struct PodcastData {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SoundResponse {
    passthrough: Option<String>,
    #[serde(rename = "passthroughUrl")]
    passthrough_url: Option<String>,
    url: Option<Vec<String>>,
}

/// Client for the RapidAPI Spotify metadata service.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl SpotifyClient {
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

    /// Fetches episode metadata, returning `None` for unknown episodes.
    pub async fn episode(&self, episode_id: &str) -> Result<Option<SpotifyEpisode>, ClientError> {
        with_retries(self.retry, "spotify episode", || self.episode_once(episode_id)).await
    }

    async fn episode_once(&self, episode_id: &str) -> Result<Option<SpotifyEpisode>, ClientError> {
        let response = self
            .http
            .get(format!("{}/episode/", self.base_url))
            .query(&[("id", episode_id)])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: EpisodeResponse = response.json().await?;

        let Some(episode) = body.data.and_then(|data| data.episode) else {
            return Ok(None);
        };

        let cover_url = episode.cover_art.and_then(|art| {
            art.sources
                .into_iter()
                .find(|source| source.width == Some(640))
                .and_then(|source| source.url)
        });
        let published_at = episode
            .release_date
            .and_then(|release| release.iso_string)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|parsed| parsed.naive_utc());

        Ok(Some(SpotifyEpisode {
            name: episode.name,
            description: episode.description,
            html_description: episode.html_description,
            duration_seconds: episode
                .duration
                .and_then(|duration| duration.total_milliseconds)
                .map(|ms| ms / 1000.0),
            cover_url,
            published_at,
            podcast_name: episode
                .podcast
                .and_then(|podcast| podcast.data)
                .and_then(|data| data.name),
        }))
    }

    /// Resolves the downloadable audio URL for an episode.
    ///
    /// Prefers the passthrough URL when the API marks it as allowed and
    /// falls back to the first CDN URL otherwise.
    pub async fn episode_audio_url(
        &self,
        episode_id: &str,
    ) -> Result<Option<String>, ClientError> {
        with_retries(self.retry, "spotify episode sound", || {
            self.episode_audio_url_once(episode_id)
        })
        .await
    }

    async fn episode_audio_url_once(
        &self,
        episode_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let response = self
            .http
            .get(format!("{}/episode_sound/", self.base_url))
            .query(&[("id", episode_id)])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: SoundResponse = response.json().await?;

        if body.passthrough.as_deref() == Some("ALLOWED")
            && let Some(url) = body.passthrough_url.filter(|url| !url.is_empty())
        {
            return Ok(Some(url));
        }
        Ok(body.url.and_then(|urls| urls.into_iter().next()))
    }
}
