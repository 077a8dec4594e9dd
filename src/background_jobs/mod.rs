//! Background work decoupled from request handling.
//!
//! Handlers enqueue typed [`Job`]s on a [`JobQueue`]; a [`WorkerPool`] pulls
//! them off and runs review enrichment or access logging.

mod access_log;
mod context;
mod job;
pub mod jobs;
mod queue;
mod sqlite_queue;
mod worker;

pub use access_log::AccessLogger;
pub use context::JobContext;
pub use job::{Delivery, Job, QueueError};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use sqlite_queue::{SqliteJobQueue, JOB_QUEUE_SCHEMA};
pub use worker::WorkerPool;
