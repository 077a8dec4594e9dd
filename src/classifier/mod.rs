//! Tone and sentiment classification of a single review.
//!
//! One provider call per review; the reply must contain a JSON object with
//! `tone` and `sentiment` fields.

use crate::llm::{CompletionOptions, LlmError, LlmProvider, Message};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Label used when the model leaves a field out.
pub const FALLBACK_LABEL: &str = "neutral";

const SYSTEM_PROMPT: &str = "You label product reviews. \
Reply with a single JSON object of the form {\"tone\": \"...\", \"sentiment\": \"...\"}. \
`tone` is one or two lowercase words describing the writing tone (for example \"enthusiastic\", \"frustrated\", \"matter-of-fact\"). \
`sentiment` is exactly one of \"positive\", \"negative\" or \"neutral\". \
Do not add any other text.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tone: String,
    pub sentiment: String,
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("LLM provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait ReviewClassifier: Send + Sync {
    /// Absent text is classified from the rating alone.
    async fn classify(
        &self,
        text: Option<&str>,
        stars: i64,
    ) -> Result<Classification, ClassificationError>;
}

pub struct LlmReviewClassifier {
    provider: Arc<dyn LlmProvider>,
    options: CompletionOptions,
}

impl LlmReviewClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: 0.0,
                max_tokens: Some(100),
                json_mode: true,
                timeout,
            },
        }
    }
}

#[async_trait]
impl ReviewClassifier for LlmReviewClassifier {
    async fn classify(
        &self,
        text: Option<&str>,
        stars: i64,
    ) -> Result<Classification, ClassificationError> {
        let messages = build_messages(text, stars);
        debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            stars,
            "Classifying review"
        );
        let response = self.provider.complete(&messages, &self.options).await?;
        if response.was_truncated() {
            warn!("Classification reply hit the token limit and may be cut short");
        }
        parse_classification(response.content())
    }
}

fn build_messages(text: Option<&str>, stars: i64) -> Vec<Message> {
    let user = format!(
        "Rating: {} stars\nReview text:\n{}",
        stars,
        text.unwrap_or("")
    );
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

/// Extracts `{tone, sentiment}` from a model reply.
///
/// Tolerates Markdown code fences and prose around the object. Values are
/// trimmed and lower-cased; missing, empty or non-string fields become
/// [`FALLBACK_LABEL`].
pub fn parse_classification(content: &str) -> Result<Classification, ClassificationError> {
    let body = strip_code_fences(content.trim());

    let (start, end) = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(ClassificationError::MalformedResponse(format!(
                "no JSON object in reply: {}",
                truncate(content)
            )))
        }
    };

    let value: Value = serde_json::from_str(&body[start..=end]).map_err(|e| {
        ClassificationError::MalformedResponse(format!("invalid JSON ({}): {}", e, truncate(content)))
    })?;
    let object = value.as_object().ok_or_else(|| {
        ClassificationError::MalformedResponse(format!("not a JSON object: {}", truncate(content)))
    })?;

    Ok(Classification {
        tone: label_field(object.get("tone")),
        sentiment: label_field(object.get("sentiment")),
    })
}

fn label_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_LABEL.to_string())
}

fn strip_code_fences(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn truncate(content: &str) -> String {
    const MAX: usize = 200;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let head: String = content.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
