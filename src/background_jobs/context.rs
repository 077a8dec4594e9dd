use crate::classifier::ReviewClassifier;
use crate::review_store::ReviewStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared resources handed to every job a worker runs.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled when the server shuts down.
    pub cancellation_token: CancellationToken,

    pub review_store: Arc<dyn ReviewStore>,

    /// Labels reviews with tone and sentiment.
    pub classifier: Arc<dyn ReviewClassifier>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        review_store: Arc<dyn ReviewStore>,
        classifier: Arc<dyn ReviewClassifier>,
    ) -> Self {
        Self {
            cancellation_token,
            review_store,
            classifier,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
