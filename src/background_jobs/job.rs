use serde::{Deserialize, Serialize};

/// Work handed from request handlers to the worker pool.
///
/// Jobs carry ids rather than state; the worker re-reads the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    EnrichReview { review_id: i64 },
    LogAccess { text: String },
}

impl Job {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::EnrichReview { .. } => "enrich_review",
            Job::LogAccess { .. } => "log_access",
        }
    }

    pub fn to_payload(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    pub fn from_payload(payload: &str) -> Result<Self, QueueError> {
        serde_json::from_str(payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// One hand-out of a job to a worker. A job may be delivered more than once.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub job: Job,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[derive(Debug)]
pub enum QueueError {
    Backend(String),
    Serialization(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Backend(msg) => write!(f, "Queue backend error: {}", msg),
            QueueError::Serialization(msg) => write!(f, "Job serialization error: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Backend(e.to_string())
    }
}
