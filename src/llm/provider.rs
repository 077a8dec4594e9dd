//! LLM provider trait definition.

use super::types::{CompletionResponse, Message};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Options for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider to answer with a single JSON object.
    pub json_mode: bool,
    /// Upper bound for the whole request; a stalled call fails with
    /// [`LlmError::Timeout`].
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,
}

/// An LLM backend reachable over the network.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai").
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Runs one completion. Exactly one network request is made; retries are
    /// left to the caller.
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, LlmError>;
}
