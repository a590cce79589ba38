//! OpenAI-compatible chat-completions adapter.
//!
//! Every request is sent as a system + user message pair with
//! `response_format = { type: "json_schema", ... }` carrying the task's schema.
//! The assistant message content is parsed as JSON; anything else is a
//! [`ParseError`] that carries the raw content for reformat recovery.
//!
//! HTTP failures map onto [`TransportError`]:
//!
//! | Condition | Retry policy |
//! |-----------|--------------|
//! | connect / timeout / body read failure | retryable |
//! | 408, 429, 5xx | retryable, honouring `Retry-After` (seconds) |
//! | any other non-success status | non-retryable |
//!
//! The mapping is [`TransportError::from_status`], shared with the search and
//! document adapters. Those also retry the search quota codes 432 and 433;
//! a chat-completions endpoint never sends them, so here they are fatal.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    parse_retry_after, Credential, GenerateError, GenerationRequest, Generator, ModelTier,
    ParseError, TransportError,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const PROVIDER: &str = "openai-compatible";

/// Construction failure for [`OpenAiCompatibleGenerator`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1`. `/chat/completions` is
    /// appended.
    pub base_url: String,
    /// Model used for [`ModelTier::Primary`] requests.
    pub model: String,
    /// Model used for [`ModelTier::Reformat`] requests; falls back to
    /// `model` when unset.
    pub reformat_model: Option<String>,
    /// Bearer token.
    pub api_key: Credential,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// [`Generator`] for OpenAI-compatible chat-completions APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleGenerator {
    client: Client,
    endpoint: String,
    model: String,
    reformat_model: String,
    api_key: Credential,
}

impl OpenAiCompatibleGenerator {
    /// Creates a generator for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Client`] if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let reformat_model = config
            .reformat_model
            .unwrap_or_else(|| config.model.clone());
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model,
            reformat_model,
            api_key: config.api_key,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.model,
            ModelTier::Reformat => &self.reformat_model,
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model_for(request.tier),
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.task,
                    "schema": request.schema,
                },
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerateError> {
        let model = self.model_for(request.tier);
        debug!(task = request.task, model, "sending generation request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| TransportError::retryable(PROVIDER, format!("request failed: {e}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::retryable(PROVIDER, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(status_error(status, retry_after, &body).into());
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| ParseError {
            task: request.task.to_string(),
            message: format!("unexpected response envelope: {e}"),
            raw: body.clone(),
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ParseError {
                task: request.task.to_string(),
                message: "response has no message content".to_string(),
                raw: body.clone(),
            })?;

        serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            GenerateError::Parse(ParseError {
                task: request.task.to_string(),
                message: e.to_string(),
                raw: content.clone(),
            })
        })
    }
}

/// Maps a non-success status onto a transport error with its retry policy.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> TransportError {
    TransportError::from_status(PROVIDER, status.as_u16(), &[], retry_after, body)
}

/// Removes a surrounding Markdown code fence (```json … ```), if present.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
