//! Chat-completion client for OpenAI-compatible provider endpoints.
//!
//! Both configured providers (OpenAI and NVIDIA) speak the same
//! `/chat/completions` wire format; they differ only in endpoint, model,
//! and whether `response_format: json_object` is honored. The client
//! returns the raw assistant content; callers parse it into their own
//! decision schema via [`extract_json_object`].

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author (`system`, `user`, `assistant`).
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// HTTP client for one provider endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    endpoint: String,
    model: String,
    api_key: String,
    /// Whether the endpoint honors `response_format: json_object`.
    json_mode: bool,
    http: reqwest::Client,
}

impl ChatCompletionClient {
    /// Create a client for one endpoint/model/key triple.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        json_mode: bool,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            json_mode,
            http,
        }
    }

    /// The model this client requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request a completion and return the assistant message content.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or an
    /// empty choice list.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
            max_tokens: 1500,
            top_p: Some(0.7),
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "provider request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Provider(format!(
                "provider returned {status}"
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Provider(format!("malformed response body: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistError::Provider("response contained no choices".to_owned()))
    }
}

/// Extract a JSON object from assistant content.
///
/// Models occasionally wrap JSON in markdown fences or prepend prose; this
/// takes the substring from the first `{` to the last `}` before parsing.
pub fn extract_json_object<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let start = content
        .find('{')
        .ok_or_else(|| AssistError::Decision("no JSON object in provider output".to_owned()))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| AssistError::Decision("unterminated JSON object in provider output".to_owned()))?;
    if end < start {
        return Err(AssistError::Decision(
            "unterminated JSON object in provider output".to_owned(),
        ));
    }
    serde_json::from_str(&content[start..=end])
        .map_err(|e| AssistError::Decision(format!("provider JSON did not match schema: {e}")))
}

// ── Tests ───────────────────────────────────────────────────────────────
