use axum::extract::FromRef;

use crate::background_jobs::{AccessLogger, JobQueue};
use crate::review_store::ReviewStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedReviewStore = Arc<dyn ReviewStore>;
pub type GuardedJobQueue = Arc<dyn JobQueue>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub review_store: GuardedReviewStore,
    pub job_queue: GuardedJobQueue,
    pub access_logger: AccessLogger,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        review_store: GuardedReviewStore,
        job_queue: GuardedJobQueue,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            review_store,
            access_logger: AccessLogger::new(job_queue.clone()),
            job_queue,
        }
    }
}

impl FromRef<ServerState> for GuardedReviewStore {
    fn from_ref(input: &ServerState) -> Self {
        input.review_store.clone()
    }
}

impl FromRef<ServerState> for GuardedJobQueue {
    fn from_ref(input: &ServerState) -> Self {
        input.job_queue.clone()
    }
}

impl FromRef<ServerState> for AccessLogger {
    fn from_ref(input: &ServerState) -> Self {
        input.access_logger.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
