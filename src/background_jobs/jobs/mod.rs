//! Handlers for each [`Job`](super::Job) kind.

mod enrich_review;
mod log_access;

pub use enrich_review::{enrich_review, EnrichmentOutcome};
pub use log_access::log_access;
