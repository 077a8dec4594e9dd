//! Category HTTP routes.
//!
//! - POST /categories/ - create a category (names unique ignoring case)
//! - GET /categories/ - list categories

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use super::state::{GuardedReviewStore, ServerState};

#[derive(Debug, Deserialize)]
pub struct CreateCategoryBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

async fn create_category(
    State(store): State<GuardedReviewStore>,
    body: Result<Json<CreateCategoryBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be blank".to_string()));
    }

    let category = store.create_category(&body.name, &body.description)?;
    info!("Created category {} '{}'", category.id, category.name);
    Ok((StatusCode::CREATED, Json(category)))
}

async fn list_categories(State(store): State<GuardedReviewStore>) -> ApiResult<impl IntoResponse> {
    let categories = store.list_categories()?;
    debug!("Listing {} categories", categories.len());
    Ok(Json(categories))
}

pub fn category_routes() -> Router<ServerState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/", get(list_categories).post(create_category))
}
