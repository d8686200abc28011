//! Chat-completion transport.
//!
//! [`ChatBackend`] is the seam between the session driver and the analysis
//! service. [`OpenAiClient`] speaks the OpenAI-compatible
//! `/v1/chat/completions` protocol over blocking HTTP.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::RedpenError;

/// Default service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Speaker of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A reply from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Something that can answer a transcript.
pub trait ChatBackend {
    /// Send the transcript and return the reply.
    fn complete(&self, messages: &[Message]) -> Result<Completion, RedpenError>;
}

impl<T: ChatBackend + ?Sized> ChatBackend for &T {
    fn complete(&self, messages: &[Message]) -> Result<Completion, RedpenError> {
        (**self).complete(messages)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Blocking client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Create a client for `model` at [`DEFAULT_BASE_URL`].
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, RedpenError> {
        Self::with_options(
            api_key,
            model,
            DEFAULT_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_options(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RedpenError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("redpen/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RedpenError::Api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

impl ChatBackend for OpenAiClient {
    fn complete(&self, messages: &[Message]) -> Result<Completion, RedpenError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
        };
        debug!(model = %self.model, messages = messages.len(), "chat request");
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| RedpenError::Api(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| RedpenError::Api(format!("failed to read response: {e}")))?;
        debug!(
            "chat response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(RedpenError::Api(format!("HTTP {status}: {text}")));
        }
        parse_response(&text)
    }
}

fn parse_response(text: &str) -> Result<Completion, RedpenError> {
    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| RedpenError::Api(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(RedpenError::Api(err.message));
    }

    let usage = parsed.usage.unwrap_or_default();
    debug!(
        prompt = usage.prompt_tokens,
        completion = usage.completion_tokens,
        total = usage.total_tokens,
        "token usage"
    );

    let content = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .ok_or_else(|| RedpenError::Api("empty response (no choices)".into()))?;

    Ok(Completion { content, usage })
}
