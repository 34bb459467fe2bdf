//! Chat-completion backends.
//!
//! The relay treats generation as an opaque, fallible, slow call: one model
//! name and the full message sequence in, one reply text out.

pub mod openai;

use async_trait::async_trait;
use parley_core::ChatMessage;
use std::time::Duration;
use thiserror::Error;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ProviderError ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("ResponseError: {0}")]
    Response(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// A remote text generator.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

/// Run `generator` with an upper bound on how long the reply may take.
pub async fn generate_bounded(
    generator: &dyn Generator,
    model: &str,
    messages: &[ChatMessage],
    limit: Duration,
) -> Result<String, GenerationError> {
    match tokio::time::timeout(limit, generator.generate(model, messages)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(limit)),
    }
}
