use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, error_for_status};
use crate::retry::{RetryPolicy, with_retries};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(2), 2.0);

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message pairing an instruction with an image to look at.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completion client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RETRY,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_fast_retry(mut self) -> Self {
        self.retry = RetryPolicy::new(RETRY.tries, Duration::from_millis(1), 1.0);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs a completion and returns the assistant's text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ClientError> {
        self.request(messages, false).await
    }

    /// Runs a completion in JSON mode; the returned string is the raw JSON
    /// document for the caller to deserialize.
    pub async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String, ClientError> {
        self.request(messages, true).await
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        json_mode: bool,
    ) -> Result<String, ClientError> {
        with_retries(self.retry, "llm completion", || {
            self.request_once(messages, json_mode)
        })
        .await
    }

    async fn request_once(
        &self,
        messages: &[ChatMessage],
        json_mode: bool,
    ) -> Result<String, ClientError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
            temperature: None,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClientError::UnexpectedResponse("completion had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn completes_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer llm-key"))
            .and(body_partial_json(json!({"model": "gpt-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "a summary"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "llm-key", "gpt-test").unwrap();
        let text = client
            .complete(&[ChatMessage::system("sum it up"), ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(text, "a summary");
    }

    #[tokio::test]
    async fn json_mode_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                json!({"response_format": {"type": "json_object"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tag_list\": [\"rust\"]}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "llm-key", "gpt-test").unwrap();
        let raw = client
            .complete_json(&[ChatMessage::user("tags please")])
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["tag_list"][0], "rust");
    }

    #[tokio::test]
    async fn vision_messages_serialize_as_parts() {
        let message = ChatMessage::user_with_image("describe", "https://img/1.png");
        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["content"][0]["type"], "text");
        assert_eq!(
            encoded["content"][1]["image_url"]["url"],
            "https://img/1.png"
        );
    }

    #[tokio::test]
    async fn empty_choices_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = LlmClient::new(server.uri(), "llm-key", "gpt-test")
            .unwrap()
            .with_fast_retry();
        let result = client.complete(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(ClientError::UnexpectedResponse(_))));
    }
}
