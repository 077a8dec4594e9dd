use super::context::JobContext;
use super::job::{Delivery, Job};
use super::jobs::{enrich_review, log_access};
use super::queue::JobQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A fixed set of tasks consuming the job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Starts `worker_count` consumers. They stop taking new jobs once
    /// `shutdown_token` is cancelled.
    pub fn spawn(
        context: JobContext,
        queue: Arc<dyn JobQueue>,
        worker_count: usize,
        shutdown_token: CancellationToken,
    ) -> Self {
        let handles = (0..worker_count)
            .map(|worker_id| {
                let context = context.clone();
                let queue = Arc::clone(&queue);
                let token = shutdown_token.clone();
                tokio::spawn(async move { worker_loop(worker_id, context, queue, token).await })
            })
            .collect();
        info!("Started {} background worker(s)", worker_count);
        Self {
            handles,
            shutdown_token,
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Waits for in-flight jobs to finish, giving up after `timeout`.
    pub async fn join(self, timeout: Duration) {
        let all = join_handles(self.handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(
                "Background workers did not stop within {:?}, abandoning in-flight jobs",
                timeout
            );
        } else {
            info!("Background workers stopped");
        }
    }
}

async fn join_handles(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Background worker task failed: {}", e);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    context: JobContext,
    queue: Arc<dyn JobQueue>,
    token: CancellationToken,
) {
    debug!(worker_id, "Worker started");
    while let Some(delivery) = queue.next_delivery(&token).await {
        process(&context, &delivery).await;
        // Failed jobs are not retried, so every delivery is acked.
        if let Err(e) = queue.ack(&delivery).await {
            warn!(delivery_id = %delivery.id, "Failed to ack job: {}", e);
        }
    }
    debug!(worker_id, "Worker stopped");
}

async fn process(context: &JobContext, delivery: &Delivery) {
    debug!(
        delivery_id = %delivery.id,
        attempt = delivery.attempt,
        kind = delivery.job.kind(),
        "Running job"
    );
    match &delivery.job {
        Job::EnrichReview { review_id } => {
            enrich_review(context, *review_id).await;
        }
        Job::LogAccess { text } => log_access(context, text),
    }
}
