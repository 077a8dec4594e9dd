//! Test server lifecycle management
//!
//! Spawns the full application (HTTP routes, job queue, workers and a mock
//! LLM) on random ports. Everything is torn down when the [`TestServer`] is
//! dropped.

use super::constants::*;
use super::mock_llm::spawn_mock_llm;
use review_trends_server::background_jobs::{InMemoryJobQueue, JobContext, JobQueue, WorkerPool};
use review_trends_server::classifier::{LlmReviewClassifier, ReviewClassifier};
use review_trends_server::llm::{LlmProvider, OpenAIProvider};
use review_trends_server::review_store::{ReviewStore, SqliteReviewStore};
use review_trends_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Direct access to the review database, for assertions the API can't make
    pub review_store: Arc<dyn ReviewStore>,

    job_queue: Arc<dyn JobQueue>,

    shutdown: CancellationToken,

    // Kept alive until the server is dropped
    _temp_dir: TempDir,
}

impl TestServer {
    /// Spawns a new test server with an empty database
    ///
    /// # Panics
    ///
    /// Panics if the server fails to start or doesn't become ready in time.
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("reviews.db");
        let review_store: Arc<dyn ReviewStore> =
            Arc::new(SqliteReviewStore::new(&db_path).expect("Failed to open review store"));
        let job_queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());

        let shutdown = CancellationToken::new();
        let llm_base_url = spawn_mock_llm(shutdown.child_token()).await;
        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new(
            llm_base_url,
            "mock-model",
            Some("test-key".to_string()),
        ));
        let classifier: Arc<dyn ReviewClassifier> =
            Arc::new(LlmReviewClassifier::new(provider, Duration::from_secs(5)));

        let context = JobContext::new(shutdown.child_token(), review_store.clone(), classifier);
        // Workers end with the runtime of the test; no explicit join needed.
        let _workers = WorkerPool::spawn(
            context,
            job_queue.clone(),
            TEST_WORKER_COUNT,
            shutdown.child_token(),
        );

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port: 0,
        };
        let app = make_app(config, review_store.clone(), job_queue.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let base_url = format!("http://{}", addr);

        let server_shutdown = shutdown.child_token();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Test server failed");
        });

        let server = Self {
            base_url,
            review_store,
            job_queue,
            shutdown,
            _temp_dir: temp_dir,
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Polls until `condition` holds or the settle timeout elapses.
    ///
    /// Returns whether the condition was met.
    pub async fn wait_until<F>(&self, mut condition: F) -> bool
    where
        F: FnMut(&dyn ReviewStore) -> bool,
    {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_SETTLE_TIMEOUT_MS);
        while start.elapsed() < timeout {
            if condition(self.review_store.as_ref()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
        condition(self.review_store.as_ref())
    }

    /// Waits for the workers to take every queued job. Returns whether the
    /// queue drained within the settle timeout.
    pub async fn wait_for_empty_queue(&self) -> bool {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_SETTLE_TIMEOUT_MS);
        loop {
            if self.job_queue.pending_count().await.unwrap_or(usize::MAX) == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
