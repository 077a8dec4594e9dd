mod models;
mod schema;
mod sqlite_review_store;

pub use models::{category_name_key, Category, CategoryTrend, NewReview, Review};
pub use schema::REVIEW_DB_SCHEMA;
pub use sqlite_review_store::SqliteReviewStore;

use thiserror::Error;

/// Maximum number of categories returned by the trends query.
pub const TRENDS_LIMIT: usize = 5;

/// Errors surfaced by the review store.
///
/// Any open transaction has already been rolled back when one of these is
/// returned.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ReviewStore: Send + Sync {
    // Categories
    /// Fails with [`StoreError::Conflict`] when a category with the same
    /// case-insensitive name exists.
    fn create_category(&self, name: &str, description: &str) -> StoreResult<Category>;
    fn get_category(&self, id: i64) -> StoreResult<Option<Category>>;
    fn list_categories(&self) -> StoreResult<Vec<Category>>;

    // Reviews
    /// Fails with [`StoreError::NotFound`] when the category does not exist.
    fn create_review(&self, review: &NewReview) -> StoreResult<Review>;
    fn get_review(&self, id: i64) -> StoreResult<Option<Review>>;
    /// Newest first, optionally restricted to one category.
    fn list_reviews(&self, category_id: Option<i64>) -> StoreResult<Vec<Review>>;
    /// Overwrites both labels and bumps `updated_at`.
    fn set_review_labels(&self, id: i64, tone: &str, sentiment: &str) -> StoreResult<Review>;
    /// Ids of reviews missing tone or sentiment.
    fn list_unprocessed_review_ids(&self) -> StoreResult<Vec<i64>>;

    // Aggregates
    /// Top categories by average rating over the latest revision of each
    /// review, best first.
    fn get_category_trends(&self, limit: usize) -> StoreResult<Vec<CategoryTrend>>;

    // Access log
    fn append_access_log(&self, text: &str) -> StoreResult<i64>;
    fn count_access_log_entries(&self) -> StoreResult<usize>;
}
