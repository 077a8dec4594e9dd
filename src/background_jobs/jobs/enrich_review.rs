//! Review enrichment job.
//!
//! ```text
//! fetch review → classify (text, stars) → write tone + sentiment
//! ```
//!
//! Best effort: a failed classification leaves the review untouched and is not
//! retried. `POST /reviews/reprocess` re-queues reviews still missing labels.

use crate::background_jobs::context::JobContext;
use crate::review_store::StoreError;
use crate::server::metrics;
use std::time::Instant;
use tracing::{debug, info, warn};

const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Updated { tone: String, sentiment: String },
    /// The review no longer exists; nothing to do.
    SkippedNotFound,
    Failed(String),
}

impl EnrichmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Updated { .. } => "updated",
            EnrichmentOutcome::SkippedNotFound => "skipped_not_found",
            EnrichmentOutcome::Failed(_) => "failed",
        }
    }
}

pub async fn enrich_review(ctx: &JobContext, review_id: i64) -> EnrichmentOutcome {
    let outcome = run(ctx, review_id).await;
    metrics::record_enrichment_outcome(outcome.as_str());
    match &outcome {
        EnrichmentOutcome::Updated { tone, sentiment } => {
            info!(review_id, tone = %tone, sentiment = %sentiment, "Review enriched");
        }
        EnrichmentOutcome::SkippedNotFound => {
            info!(review_id, "Review not found, skipping enrichment");
        }
        EnrichmentOutcome::Failed(reason) => {
            warn!(review_id, "Review enrichment failed: {}", reason);
        }
    }
    outcome
}

async fn run(ctx: &JobContext, review_id: i64) -> EnrichmentOutcome {
    let review = match ctx.review_store.get_review(review_id) {
        Ok(Some(review)) => review,
        Ok(None) => return EnrichmentOutcome::SkippedNotFound,
        Err(e) => return EnrichmentOutcome::Failed(format!("Failed to load review: {}", e)),
    };

    if ctx.is_cancelled() {
        return EnrichmentOutcome::Failed(CANCELLED.to_string());
    }

    debug!(review_id, stars = review.stars, "Classifying review");
    let started = Instant::now();
    // Shutdown abandons a stalled model call instead of waiting out its timeout.
    let result = tokio::select! {
        biased;
        _ = ctx.cancellation_token.cancelled() => {
            return EnrichmentOutcome::Failed(CANCELLED.to_string());
        }
        result = ctx.classifier.classify(review.text.as_deref(), review.stars) => result,
    };
    metrics::record_classification(started.elapsed());

    let classification = match result {
        Ok(classification) => classification,
        Err(e) => return EnrichmentOutcome::Failed(e.to_string()),
    };

    let tone = classification.tone.to_lowercase();
    let sentiment = classification.sentiment.to_lowercase();
    match ctx
        .review_store
        .set_review_labels(review_id, &tone, &sentiment)
    {
        Ok(_) => EnrichmentOutcome::Updated { tone, sentiment },
        Err(StoreError::NotFound(_)) => EnrichmentOutcome::SkippedNotFound,
        Err(e) => EnrichmentOutcome::Failed(format!("Failed to store labels: {}", e)),
    }
}
