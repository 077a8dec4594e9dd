//! A stand-in for an OpenAI-compatible chat completions endpoint.
//!
//! Classifies a review as negative when the user message contains
//! [`NEGATIVE_MARKER`], positive otherwise.

use super::constants::*;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn chat_completions(Json(request): Json<Value>) -> Json<Value> {
    let user_text = request["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_lowercase();

    let (tone, sentiment) = if user_text.contains(NEGATIVE_MARKER) {
        (NEGATIVE_TONE, NEGATIVE_SENTIMENT)
    } else {
        (POSITIVE_TONE, POSITIVE_SENTIMENT)
    };
    // Upper case on purpose: stored labels must come out lower-cased.
    let content = json!({
        "tone": tone.to_uppercase(),
        "sentiment": sentiment.to_uppercase(),
    })
    .to_string();

    Json(json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
    }))
}

/// Starts the mock on a random port and returns its base URL.
pub async fn spawn_mock_llm(shutdown: CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock LLM listener");
    let addr = listener.local_addr().expect("Failed to get mock LLM address");
    let app = Router::new().route("/chat/completions", post(chat_completions));

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .expect("Mock LLM server failed");
    });

    format!("http://{}", addr)
}
