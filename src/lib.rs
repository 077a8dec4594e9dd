//! Review Trends Server Library
//!
//! Stores product reviews by category, computes per-category rating trends
//! and labels reviews with tone and sentiment in the background.

pub mod background_jobs;
pub mod classifier;
pub mod config;
pub mod llm;
pub mod review_store;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use review_store::{ReviewStore, SqliteReviewStore};
pub use server::{run_server, RequestsLoggingLevel};
