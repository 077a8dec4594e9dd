//! Review HTTP routes.
//!
//! - POST /reviews/ - store a review revision and queue its enrichment
//! - GET /reviews/ - list reviews, newest first, optionally by category
//! - GET /reviews/trends - top categories by average rating
//! - POST /reviews/reprocess - queue enrichment for unlabelled reviews

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::metrics;
use super::state::{GuardedJobQueue, GuardedReviewStore, ServerState};
use crate::background_jobs::{AccessLogger, Job, JobQueue};
use crate::review_store::{NewReview, TRENDS_LIMIT};

#[derive(Debug, Deserialize)]
pub struct CreateReviewBody {
    #[serde(default)]
    pub text: Option<String>,
    pub stars: i64,
    pub review_id: String,
    pub category_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListReviewsQuery {
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub queued: usize,
}

/// Enqueues enrichment for one review. Failure is logged and reported as
/// `false`; the review stays recoverable through reprocess.
async fn enqueue_enrichment(queue: &dyn JobQueue, review_id: i64) -> bool {
    let job = Job::EnrichReview { review_id };
    let kind = job.kind();
    match queue.enqueue(job).await {
        Ok(()) => {
            metrics::record_job_enqueued(kind, true);
            true
        }
        Err(e) => {
            metrics::record_job_enqueued(kind, false);
            warn!("Failed to enqueue enrichment for review {}: {}", review_id, e);
            false
        }
    }
}

async fn create_review(
    State(store): State<GuardedReviewStore>,
    State(queue): State<GuardedJobQueue>,
    body: Result<Json<CreateReviewBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    if body.review_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "review_id must not be blank".to_string(),
        ));
    }

    let review = store.create_review(&NewReview {
        text: body.text,
        stars: body.stars,
        review_id: body.review_id,
        category_id: body.category_id,
    })?;
    info!(
        "Stored review {} (review_id '{}') in category {}",
        review.id, review.review_id, review.category_id
    );

    enqueue_enrichment(queue.as_ref(), review.id).await;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn list_reviews(
    State(store): State<GuardedReviewStore>,
    State(access_logger): State<AccessLogger>,
    query: Result<Query<ListReviewsQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let reviews = store.list_reviews(query.category_id)?;

    access_logger.record(match query.category_id {
        Some(category_id) => format!("GET /reviews/?category_id={}", category_id),
        None => "GET /reviews/".to_string(),
    });
    Ok(Json(reviews))
}

async fn get_trends(
    State(store): State<GuardedReviewStore>,
    State(access_logger): State<AccessLogger>,
) -> ApiResult<impl IntoResponse> {
    let trends = store.get_category_trends(TRENDS_LIMIT)?;
    access_logger.record("GET /reviews/trends");
    Ok(Json(trends))
}

async fn reprocess_reviews(
    State(store): State<GuardedReviewStore>,
    State(queue): State<GuardedJobQueue>,
) -> ApiResult<impl IntoResponse> {
    let ids = store.list_unprocessed_review_ids()?;
    let mut queued = 0;
    for id in &ids {
        if enqueue_enrichment(queue.as_ref(), *id).await {
            queued += 1;
        }
    }
    if queued < ids.len() {
        return Err(ApiError::Internal(format!(
            "Queued {} of {} reviews; the job queue refused the rest",
            queued,
            ids.len()
        )));
    }
    info!("Queued {} review(s) for re-enrichment", queued);
    Ok(Json(ReprocessResponse { queued }))
}

pub fn review_routes() -> Router<ServerState> {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/reviews/", get(list_reviews).post(create_review))
        .route("/reviews/trends", get(get_trends))
        .route("/reviews/reprocess", post(reprocess_reviews))
}
