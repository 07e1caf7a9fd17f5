use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::SubtitleSegment;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, error_for_status};

const QUEUE_BASE: &str = "https://queue.fal.run";
const MODEL: &str = "fal-ai/wizper";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const TRANSCRIBE_DEADLINE: Duration = Duration::from_secs(1800);

/// Language codes the transcription model accepts.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw", "he",
    "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn", "ko", "la",
    "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl",
    "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si", "sk", "sl", "sn", "so",
    "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl", "tr", "tt", "uk", "ur", "uz",
    "vi", "yi", "yo", "yue", "zh",
];

pub fn is_supported_language(lang: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&lang)
}

/// Wraps locally stored audio as a base64 data URL so it can be submitted
/// without a publicly reachable file server.
pub fn audio_data_url(file_name: &str, bytes: &[u8]) -> String {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let mime = match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    };
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResult {
    #[serde(default)]
    chunks: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    timestamp: Vec<f64>,
    #[serde(default)]
    text: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Speech-to-text client backed by the fal.ai queue API.
#[derive(Debug, Clone)]
pub struct AsrClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    deadline: Duration,
}

impl AsrClient {
    pub fn new(api_key: &str) -> Result<Self, ClientError> {
        Self::with_base(api_key, QUEUE_BASE)
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(
        api_key: &str,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let mut client = Self::with_base(api_key, base_url)?;
        client.poll_interval = Duration::from_millis(1);
        client.deadline = Duration::from_secs(2);
        Ok(client)
    }

    fn with_base(api_key: &str, base_url: impl Into<String>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Key {api_key}"))
            .map_err(|_| ClientError::Config("invalid fal api key".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            poll_interval: POLL_INTERVAL,
            deadline: TRANSCRIBE_DEADLINE,
        })
    }

    /// Queues a transcription and returns the request id.
    ///
    /// An unsupported language hint is dropped rather than rejected, since
    /// the model can usually detect the language on its own.
    pub async fn submit(
        &self,
        audio_url: &str,
        language: Option<&str>,
    ) -> Result<String, ClientError> {
        let language = language.filter(|lang| {
            if is_supported_language(lang) {
                true
            } else {
                tracing::warn!(lang, "language not supported by transcription model");
                false
            }
        });
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, MODEL))
            .json(&SubmitRequest {
                audio_url,
                language,
            })
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let submitted: SubmitResponse = response.json().await?;
        Ok(submitted.request_id)
    }

    async fn request_status(&self, request_id: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .get(format!(
                "{}/{}/requests/{}/status",
                self.base_url, MODEL, request_id
            ))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let status: StatusResponse = response.json().await?;
        Ok(status.status)
    }

    /// Fetches the finished transcription and normalizes its chunks.
    ///
    /// Chunks with missing or malformed timestamps are skipped.
    pub async fn fetch_result(&self, request_id: &str) -> Result<Vec<SubtitleSegment>, ClientError> {
        let response = self
            .http
            .get(format!("{}/{}/requests/{}", self.base_url, MODEL, request_id))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let result: TranscriptionResult = response.json().await?;

        let mut segments = Vec::with_capacity(result.chunks.len());
        for raw in result.chunks {
            let Ok(chunk) = serde_json::from_value::<WireChunk>(raw.clone()) else {
                tracing::warn!(%raw, "skipping malformed transcription chunk");
                continue;
            };
            if chunk.timestamp.len() < 2 {
                tracing::warn!(%raw, "skipping transcription chunk without a timestamp range");
                continue;
            }
            segments.push(SubtitleSegment::new(
                chunk.text,
                round2(chunk.timestamp[0]),
                round2(chunk.timestamp[1] - chunk.timestamp[0]),
            ));
        }
        Ok(segments)
    }

    /// Submits `audio_url` and polls the queue until the transcription is
    /// done, honoring the client's overall deadline.
    pub async fn transcribe(
        &self,
        audio_url: &str,
        language: Option<&str>,
    ) -> Result<Vec<SubtitleSegment>, ClientError> {
        let request_id = self.submit(audio_url, language).await?;
        tracing::debug!(request_id, "transcription queued");

        let started = tokio::time::Instant::now();
        loop {
            if started.elapsed() > self.deadline {
                return Err(ClientError::DeadlineExceeded {
                    operation: "transcription".into(),
                    seconds: self.deadline.as_secs(),
                });
            }
            match self.request_status(&request_id).await?.as_str() {
                "COMPLETED" => return self.fetch_result(&request_id).await,
                "IN_QUEUE" | "IN_PROGRESS" => tokio::time::sleep(self.poll_interval).await,
                other => {
                    return Err(ClientError::UnexpectedResponse(format!(
                        "transcription ended with status {other}"
                    )));
                }
            }
        }
    }
}
