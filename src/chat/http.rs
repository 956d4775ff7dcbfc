use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatMessage};
use crate::config::ChatSettings;
use crate::error::ChatError;

/// Client for any endpoint speaking the OpenAI `chat/completions` dialect.
///
/// One request per call, no retries: a failed turn is retried by the caller resubmitting.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    timeout_secs: u64,
    client: Client,
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiCompatClient {
    pub fn new(api_key: String, settings: &ChatSettings) -> Result<Self, ChatError> {
        if api_key.trim().is_empty() {
            return Err(ChatError::Config("empty API key".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatBackend for OpenAiCompatClient {
    fn complete(&self, transcript: &[ChatMessage]) -> Result<String, ChatError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: transcript,
            temperature: self.temperature,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ChatError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ChatError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                ChatError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            let message = extract_error_message(&body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    body.clone()
                }
            });
            return Err(ChatError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::MalformedResponse(format!("invalid JSON: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::MalformedResponse("no message content".into()))?;
        if content.trim().is_empty() {
            return Err(ChatError::MalformedResponse("empty message content".into()));
        }
        Ok(content)
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;
    if let Some(msg) = parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Some(msg.to_string());
    }
    parsed
        .get("message")
        .and_then(|m| m.as_str())
        .map(ToOwned::to_owned)
}
