//! Job queue abstraction and the in-process backend.

use super::job::{Delivery, Job, QueueError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// At-least-once, unordered hand-off between producers and workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Waits for the next job. Returns `None` once `token` is cancelled.
    async fn next_delivery(&self, token: &CancellationToken) -> Option<Delivery>;

    /// Marks a delivery as done so it is never handed out again.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn pending_count(&self) -> Result<usize, QueueError>;
}

/// FIFO queue living in process memory. Jobs are lost on restart.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // The deque is never left half-modified, so a poisoned lock is still usable.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.jobs().push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn next_delivery(&self, token: &CancellationToken) -> Option<Delivery> {
        loop {
            if token.is_cancelled() {
                return None;
            }
            let notified = self.notify.notified();
            if let Some(job) = self.jobs().pop_front() {
                return Some(Delivery {
                    id: Uuid::new_v4().to_string(),
                    job,
                    attempt: 1,
                });
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.jobs().len())
    }
}
