//! Records stored in the review database.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// One revision of a product review.
///
/// Several rows may share the same `review_id` (the external correlation key);
/// each row is a revision and the one with the latest `created_at` is current.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub text: Option<String>,
    /// No range is enforced on the rating.
    pub stars: i64,
    pub review_id: String,
    pub tone: Option<String>,
    pub sentiment: Option<String>,
    pub category_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn is_enriched(&self) -> bool {
        self.tone.is_some() && self.sentiment.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub text: Option<String>,
    pub stars: i64,
    pub review_id: String,
    pub category_id: i64,
}

/// Aggregated rating of one category over the latest revision of each review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrend {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub average_stars: f64,
    pub total_reviews: i64,
}

/// Normalized form of a category name used for the uniqueness check.
pub fn category_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub(crate) fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
