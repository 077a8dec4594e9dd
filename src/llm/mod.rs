//! LLM provider abstraction layer.
//!
//! The classifier talks to a [`LlmProvider`] and never to a concrete backend,
//! so tests can script replies without a network.

mod openai;
mod provider;
mod types;

pub use openai::{OpenAIProvider, DEFAULT_OPENAI_BASE_URL};
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{CompletionResponse, FinishReason, Message, MessageRole, TokenUsage};
