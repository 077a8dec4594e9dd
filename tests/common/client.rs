//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn create_category(&self, name: &str, description: &str) -> Response {
        self.client
            .post(format!("{}/categories/", self.base_url))
            .json(&json!({"name": name, "description": description}))
            .send()
            .await
            .expect("Create category request failed")
    }

    pub async fn list_categories(&self) -> Response {
        self.client
            .get(format!("{}/categories/", self.base_url))
            .send()
            .await
            .expect("List categories request failed")
    }

    /// Creates a category and returns its id, panicking on any other outcome.
    pub async fn create_category_id(&self, name: &str) -> i64 {
        let response = self.create_category(name, "").await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = response.json().await.unwrap();
        body["id"].as_i64().expect("Category id missing")
    }

    // ========================================================================
    // Reviews
    // ========================================================================

    pub async fn create_review(
        &self,
        text: Option<&str>,
        stars: i64,
        review_id: &str,
        category_id: i64,
    ) -> Response {
        self.client
            .post(format!("{}/reviews/", self.base_url))
            .json(&json!({
                "text": text,
                "stars": stars,
                "review_id": review_id,
                "category_id": category_id,
            }))
            .send()
            .await
            .expect("Create review request failed")
    }

    /// Sends an arbitrary JSON body to the review creation endpoint
    pub async fn create_review_raw(&self, body: serde_json::Value) -> Response {
        self.client
            .post(format!("{}/reviews/", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Create review request failed")
    }

    pub async fn list_reviews(&self, category_id: Option<i64>) -> Response {
        let url = match category_id {
            Some(id) => format!("{}/reviews/?category_id={}", self.base_url, id),
            None => format!("{}/reviews/", self.base_url),
        };
        self.client
            .get(url)
            .send()
            .await
            .expect("List reviews request failed")
    }

    pub async fn get_trends(&self) -> Response {
        self.client
            .get(format!("{}/reviews/trends", self.base_url))
            .send()
            .await
            .expect("Trends request failed")
    }

    pub async fn reprocess(&self) -> Response {
        self.client
            .post(format!("{}/reviews/reprocess", self.base_url))
            .send()
            .await
            .expect("Reprocess request failed")
    }
}
