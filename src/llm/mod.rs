//! LLM — chat-completions client for the assistant features.
//!
//! DESIGN
//! ======
//! One provider, one endpoint: an OpenAI-compatible `/chat/completions`
//! call returning plain text. The [`LlmChat`] trait is the seam the AI
//! service depends on, so tests substitute a mock instead of the network.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClientBuild(String),
    #[error("LLM API request failed: {0}")]
    ApiRequest(String),
    #[error("LLM API returned status {status}: {body}")]
    ApiResponse { status: u16, body: String },
    #[error("failed to parse LLM API response: {0}")]
    ApiParse(String),
}

/// Chat seam between the AI service and the provider.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// One system + one user turn, plain-text reply.
    async fn chat(&self, max_tokens: u32, system: &str, user: &str) -> Result<String, LlmError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    /// Build from environment variables.
    ///
    /// - `LLM_API_KEY`: required
    /// - `LLM_MODEL`: defaults to `gpt-4o-mini`
    /// - `LLM_BASE_URL`: defaults to the OpenAI API
    ///
    /// # Errors
    ///
    /// `Config` if the key is missing, `HttpClientBuild` if reqwest fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("LLM_API_KEY").map_err(|_| LlmError::Config("LLM_API_KEY".to_string()))?;
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url = std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, model, base_url)
    }

    /// # Errors
    ///
    /// `HttpClientBuild` if the reqwest client cannot be constructed.
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, max_tokens: u32, system: &str, user: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        parse_chat_response(&text)
    }
}

pub(crate) fn parse_chat_response(json_text: &str) -> Result<String, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    root.get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| LlmError::ApiParse("missing choices[0].message.content".to_string()))
}
