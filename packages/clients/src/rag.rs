use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, error_for_status};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 1x1 transparent PNG used as the avatar for datasets we create.
const DATASET_AVATAR: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mP8/x8AAwMCAO+ip1sAAAAASUVORK5CYII=";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagDataset {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub chunk_count: i64,
    #[serde(default)]
    pub progress_msg: Option<String>,
}

/// Parsing lifecycle states reported for an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocRunStatus {
    Unstart,
    Running,
    Cancel,
    Done,
    Fail,
}

impl RagDocument {
    pub fn run_status(&self) -> Option<DocRunStatus> {
        match self.run.as_deref() {
            Some("UNSTART") => Some(DocRunStatus::Unstart),
            Some("RUNNING") => Some(DocRunStatus::Running),
            Some("CANCEL") => Some(DocRunStatus::Cancel),
            Some("DONE") => Some(DocRunStatus::Done),
            Some("FAIL") => Some(DocRunStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentPage {
    #[serde(default)]
    docs: Vec<RagDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagChat {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagSession {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Sampling parameters applied to a chat assistant.
#[derive(Debug, Clone, Serialize)]
pub struct ChatLlmSettings {
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<ChatLlmSettings>,
}

/// One streamed completion frame. `answer` is cumulative, so each frame
/// carries the full text generated so far.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerFrame {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub chunks: Vec<ReferenceChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<StreamData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamData {
    Done(bool),
    Frame(AnswerFrame),
}

#[derive(Debug, Serialize)]
struct CreateDatasetRequest<'a> {
    name: &'a str,
    avatar: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_model: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct IdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct DocumentIdsRequest<'a> {
    document_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    name: &'a str,
    dataset_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    question: &'a str,
    stream: bool,
    session_id: &'a str,
}

/// Client for the RAG engine's HTTP API.
///
/// Covers the slices of the surface this service uses: dataset and document
/// management for indexing, chat assistants and sessions for retrieval chat.
#[derive(Debug, Clone)]
pub struct RagClient {
    http: reqwest::Client,
    base_url: String,
}

impl RagClient {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ClientError::Config("invalid rag api key".into()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        // No global timeout: completions keep the response open while the
        // assistant streams. Unary calls set a per-request timeout instead.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, ClientError> {
        let response = error_for_status(response).await?;
        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != 0 {
            return Err(ClientError::Api {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    /// Looks a dataset up by its exact name.
    pub async fn find_dataset(&self, name: &str) -> Result<Option<RagDataset>, ClientError> {
        let response = self
            .http
            .get(self.url("/datasets"))
            .query(&[("name", name)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let datasets: Option<Vec<RagDataset>> = Self::parse(response).await?;
        Ok(datasets.and_then(|list| list.into_iter().next()))
    }

    pub async fn create_dataset(
        &self,
        name: &str,
        embedding_model: Option<&str>,
    ) -> Result<RagDataset, ClientError> {
        let response = self
            .http
            .post(self.url("/datasets"))
            .timeout(REQUEST_TIMEOUT)
            .json(&CreateDatasetRequest {
                name,
                avatar: DATASET_AVATAR,
                embedding_model,
            })
            .send()
            .await?;
        Self::parse(response).await?.ok_or_else(|| {
            ClientError::UnexpectedResponse("dataset creation returned no dataset".into())
        })
    }

    pub async fn delete_datasets(&self, ids: &[String]) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url("/datasets"))
            .timeout(REQUEST_TIMEOUT)
            .json(&IdsRequest { ids })
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Uploads one document blob into a dataset.
    pub async fn upload_document(
        &self,
        dataset_id: &str,
        display_name: &str,
        blob: Vec<u8>,
    ) -> Result<RagDocument, ClientError> {
        let part = reqwest::multipart::Part::bytes(blob).file_name(display_name.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(self.url(&format!("/datasets/{dataset_id}/documents")))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let documents: Option<Vec<RagDocument>> = Self::parse(response).await?;
        documents
            .and_then(|list| list.into_iter().next())
            .ok_or_else(|| {
                ClientError::UnexpectedResponse("document upload returned no document".into())
            })
    }

    /// Overrides the parser configuration of an uploaded document.
    pub async fn update_document_parser(
        &self,
        dataset_id: &str,
        document_id: &str,
        parser_config: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .put(self.url(&format!(
                "/datasets/{dataset_id}/documents/{document_id}"
            )))
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({ "parser_config": parser_config }))
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Kicks off asynchronous chunking for the given documents.
    pub async fn start_parsing(
        &self,
        dataset_id: &str,
        document_ids: &[String],
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/datasets/{dataset_id}/chunks")))
            .timeout(REQUEST_TIMEOUT)
            .json(&DocumentIdsRequest { document_ids })
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Fetches a single document's state, `None` when it no longer exists.
    pub async fn get_document(
        &self,
        dataset_id: &str,
        document_id: &str,
    ) -> Result<Option<RagDocument>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/datasets/{dataset_id}/documents")))
            .query(&[("id", document_id)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let page: Option<DocumentPage> = Self::parse(response).await?;
        Ok(page.and_then(|page| page.docs.into_iter().next()))
    }

    /// Looks a chat assistant up by its exact name.
    pub async fn find_chat(&self, name: &str) -> Result<Option<RagChat>, ClientError> {
        let response = self
            .http
            .get(self.url("/chats"))
            .query(&[("name", name)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let chats: Option<Vec<RagChat>> = Self::parse(response).await?;
        Ok(chats.and_then(|list| list.into_iter().next()))
    }

    pub async fn create_chat(
        &self,
        name: &str,
        dataset_ids: &[String],
    ) -> Result<RagChat, ClientError> {
        let response = self
            .http
            .post(self.url("/chats"))
            .timeout(REQUEST_TIMEOUT)
            .json(&CreateChatRequest { name, dataset_ids })
            .send()
            .await?;
        Self::parse(response).await?.ok_or_else(|| {
            ClientError::UnexpectedResponse("chat creation returned no assistant".into())
        })
    }

    pub async fn update_chat(&self, chat_id: &str, update: &ChatUpdate) -> Result<(), ClientError> {
        let response = self
            .http
            .put(self.url(&format!("/chats/{chat_id}")))
            .timeout(REQUEST_TIMEOUT)
            .json(update)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn list_sessions(&self, chat_id: &str) -> Result<Vec<RagSession>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/chats/{chat_id}/sessions")))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let sessions: Option<Vec<RagSession>> = Self::parse(response).await?;
        Ok(sessions.unwrap_or_default())
    }

    pub async fn create_session(
        &self,
        chat_id: &str,
        name: &str,
    ) -> Result<RagSession, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/chats/{chat_id}/sessions")))
            .timeout(REQUEST_TIMEOUT)
            .json(&CreateSessionRequest { name })
            .send()
            .await?;
        Self::parse(response).await?.ok_or_else(|| {
            ClientError::UnexpectedResponse("session creation returned no session".into())
        })
    }

    /// Streams an answer for `question` within an existing session.
    ///
    /// Frames carry the cumulative answer text; the terminal marker frame is
    /// consumed by the client and ends the stream.
    pub async fn ask(
        &self,
        chat_id: &str,
        session_id: &str,
        question: &str,
    ) -> Result<BoxStream<'static, Result<AnswerFrame, ClientError>>, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/chats/{chat_id}/completions")))
            .json(&CompletionRequest {
                question,
                stream: true,
                session_id,
            })
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_stream_event(&event.data),
                    Err(err) => Some(Err(ClientError::UnexpectedResponse(format!(
                        "answer stream error: {err}"
                    )))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

fn parse_stream_event(data: &str) -> Option<Result<AnswerFrame, ClientError>> {
    let envelope: StreamEnvelope = match serde_json::from_str(data) {
        Ok(envelope) => envelope,
        Err(err) => return Some(Err(ClientError::Decode(err))),
    };
    if envelope.code != 0 {
        return Some(Err(ClientError::Api {
            code: envelope.code,
            message: envelope.message.unwrap_or_default(),
        }));
    }
    match envelope.data {
        Some(StreamData::Frame(frame)) => Some(Ok(frame)),
        Some(StreamData::Done(_)) | None => None,
    }
}
