//! Fire-and-forget producer of access-log jobs.

use super::job::Job;
use super::queue::JobQueue;
use crate::server::metrics;
use std::sync::Arc;
use tracing::warn;

/// Records that an endpoint was hit without delaying the response.
#[derive(Clone)]
pub struct AccessLogger {
    queue: Arc<dyn JobQueue>,
}

impl AccessLogger {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Spawns the enqueue and returns immediately. Failures are logged and
    /// never reach the caller. Must be called from within a tokio runtime.
    pub fn record(&self, text: impl Into<String>) {
        let queue = Arc::clone(&self.queue);
        let job = Job::LogAccess { text: text.into() };
        tokio::spawn(async move {
            let kind = job.kind();
            match queue.enqueue(job).await {
                Ok(()) => metrics::record_job_enqueued(kind, true),
                Err(e) => {
                    metrics::record_job_enqueued(kind, false);
                    warn!("Failed to enqueue access log entry: {}", e);
                }
            }
        });
    }
}
