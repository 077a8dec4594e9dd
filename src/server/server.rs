use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State, middleware, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::category_routes::category_routes;
use super::metrics::metrics_handler;
use super::review_routes::review_routes;
use super::{log_requests, state::*, ServerConfig};

const WELCOME_MESSAGE: &str = "Welcome to the Reviews API!";

#[derive(Serialize)]
struct ServerStats {
    pub message: &'static str,
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        message: WELCOME_MESSAGE,
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

pub fn make_app(
    config: ServerConfig,
    review_store: GuardedReviewStore,
    job_queue: GuardedJobQueue,
) -> Router {
    let state = ServerState::new(config, review_store, job_queue);

    Router::new()
        .route("/", get(home))
        .merge(category_routes())
        .merge(review_routes())
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serves the API until `shutdown` is cancelled, then drains open requests.
pub async fn run_server(
    config: ServerConfig,
    review_store: GuardedReviewStore,
    job_queue: GuardedJobQueue,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, review_store, job_queue);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind API port {}", port))?;
    info!("Ready to serve at port {}!", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("API server failed")
}

/// Serves Prometheus metrics on their own port.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}!", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Metrics server failed")
}
