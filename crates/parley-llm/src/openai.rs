//! OpenAI-compatible `/chat/completions` client.

use crate::{GenerationError, Generator};
use async_trait::async_trait;
use parley_core::config::GenerationConfig;
use parley_core::ChatMessage;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    http_client: HttpClient,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl OpenAiClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `timeout` bounds each HTTP exchange at the transport level.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}. Using default client.", e);
                HttpClient::new()
            });
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client,
        }
    }

    pub fn from_config(cfg: &GenerationConfig) -> Self {
        Self::new(cfg.base_url.clone(), cfg.api_key.clone(), cfg.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
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

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let mut request = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&CompletionRequest { model, messages });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GenerationError::Provider { status: status.as_u16(), message });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Response(format!("malformed completion: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Response("No content in response".to_string()))
    }
}
