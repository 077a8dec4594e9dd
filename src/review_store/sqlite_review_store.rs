use super::models::{category_name_key, round_to_cents, Category, CategoryTrend, NewReview, Review};
use super::schema::REVIEW_DB_SCHEMA;
use super::{ReviewStore, StoreError, StoreResult};
use crate::sqlite_persistence::{format_timestamp, parse_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Picks the latest revision of every correlation key.
///
/// Step one finds the greatest `created_at` per `review_id`; step two joins
/// back on `(review_id, created_at)`. Rows tied on `created_at` collapse onto
/// the greatest row id, and `tied` reports how many rows shared the timestamp.
const LATEST_REVISIONS_CTE: &str = "
    WITH latest_created AS (
        SELECT review_id, MAX(created_at) AS created_at
        FROM review_history
        GROUP BY review_id
    ),
    latest_rows AS (
        SELECT MAX(r.id) AS id, COUNT(*) AS tied
        FROM review_history r
        JOIN latest_created l
          ON r.review_id = l.review_id AND r.created_at = l.created_at
        GROUP BY r.review_id
    )";

const REVIEW_COLUMNS: &str =
    "id, text, stars, review_id, tone, sentiment, category_id, created_at, updated_at";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return StoreError::Conflict(err.to_string())
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return StoreError::NotFound(err.to_string())
                }
                _ => {}
            }
        }
        StoreError::Persistence(err.to_string())
    }
}

/// SQLite-backed review store.
#[derive(Clone)]
pub struct SqliteReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReviewStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open review database at {:?}", path))?;
        REVIEW_DB_SCHEMA
            .create_or_validate(&conn)
            .with_context(|| format!("Review database at {:?} has an unexpected schema", path))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on review database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        info!(
            "Review store ready at {:?}: {} categories",
            path,
            store.list_categories().map(|c| c.len()).unwrap_or(0)
        );
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        REVIEW_DB_SCHEMA.create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Persistence("review database lock poisoned".to_string()))
    }

    fn timestamp_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(column)?;
        parse_timestamp(&raw).ok_or_else(|| {
            let index = row.as_ref().column_index(column).unwrap_or_default();
            rusqlite::Error::FromSqlConversionFailure(
                index,
                Type::Text,
                format!("invalid timestamp {:?} in column {}", raw, column).into(),
            )
        })
    }

    fn row_to_review(row: &Row) -> rusqlite::Result<Review> {
        Ok(Review {
            id: row.get("id")?,
            text: row.get("text")?,
            stars: row.get("stars")?,
            review_id: row.get("review_id")?,
            tone: row.get("tone")?,
            sentiment: row.get("sentiment")?,
            category_id: row.get("category_id")?,
            created_at: Self::timestamp_column(row, "created_at")?,
            updated_at: Self::timestamp_column(row, "updated_at")?,
        })
    }

    fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
        })
    }

    fn query_review(conn: &Connection, id: i64) -> rusqlite::Result<Option<Review>> {
        conn.query_row(
            &format!("SELECT {} FROM review_history WHERE id = ?1", REVIEW_COLUMNS),
            params![id],
            Self::row_to_review,
        )
        .optional()
    }

    /// Inserts a review revision stamped with `now`.
    fn insert_review(&self, review: &NewReview, now: DateTime<Utc>) -> StoreResult<Review> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let category_exists = tx
            .query_row(
                "SELECT 1 FROM category WHERE id = ?1",
                params![review.category_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !category_exists {
            return Err(StoreError::NotFound(format!(
                "Category {} not found",
                review.category_id
            )));
        }

        let timestamp = format_timestamp(&now);
        tx.execute(
            "INSERT INTO review_history
             (text, stars, review_id, tone, sentiment, category_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5, ?5)",
            params![
                review.text,
                review.stars,
                review.review_id,
                review.category_id,
                timestamp
            ],
        )?;
        let id = tx.last_insert_rowid();
        let created = Self::query_review(&tx, id)?
            .ok_or_else(|| StoreError::Persistence(format!("Review {} vanished on insert", id)))?;
        tx.commit()?;
        Ok(created)
    }
}

impl ReviewStore for SqliteReviewStore {
    fn create_category(&self, name: &str, description: &str) -> StoreResult<Category> {
        let name = name.trim();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Err(e) = tx.execute(
            "INSERT INTO category (name, name_key, description) VALUES (?1, ?2, ?3)",
            params![name, category_name_key(name), description],
        ) {
            return Err(match StoreError::from(e) {
                StoreError::Conflict(_) => {
                    StoreError::Conflict(format!("Category '{}' already exists", name))
                }
                other => other,
            });
        }
        let category = Category {
            id: tx.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
        };
        tx.commit()?;
        Ok(category)
    }

    fn get_category(&self, id: i64) -> StoreResult<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name, description FROM category WHERE id = ?1",
                params![id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT id, name, description FROM category ORDER BY id")?;
        let categories = stmt
            .query_map([], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    fn create_review(&self, review: &NewReview) -> StoreResult<Review> {
        self.insert_review(review, Utc::now())
    }

    fn get_review(&self, id: i64) -> StoreResult<Option<Review>> {
        let conn = self.conn()?;
        Ok(Self::query_review(&conn, id)?)
    }

    fn list_reviews(&self, category_id: Option<i64>) -> StoreResult<Vec<Review>> {
        let conn = self.conn()?;
        let reviews = match category_id {
            Some(category_id) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {} FROM review_history WHERE category_id = ?1
                     ORDER BY created_at DESC, id DESC",
                    REVIEW_COLUMNS
                ))?;
                let rows = stmt.query_map(params![category_id], Self::row_to_review)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {} FROM review_history ORDER BY created_at DESC, id DESC",
                    REVIEW_COLUMNS
                ))?;
                let rows = stmt.query_map([], Self::row_to_review)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(reviews)
    }

    fn set_review_labels(&self, id: i64, tone: &str, sentiment: &str) -> StoreResult<Review> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE review_history SET tone = ?1, sentiment = ?2, updated_at = ?3 WHERE id = ?4",
            params![tone, sentiment, format_timestamp(&Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("Review {} not found", id)));
        }
        let updated = Self::query_review(&tx, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Review {} not found", id)))?;
        tx.commit()?;
        Ok(updated)
    }

    fn list_unprocessed_review_ids(&self) -> StoreResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM review_history WHERE tone IS NULL OR sentiment IS NULL ORDER BY id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    fn get_category_trends(&self, limit: usize) -> StoreResult<Vec<CategoryTrend>> {
        let conn = self.conn()?;

        let tied_groups: i64 = conn.query_row(
            &format!(
                "{} SELECT COUNT(*) FROM latest_rows WHERE tied > 1",
                LATEST_REVISIONS_CTE
            ),
            [],
            |row| row.get(0),
        )?;
        if tied_groups > 0 {
            warn!(
                "{} review(s) have several revisions sharing the latest created_at; \
                 using the most recently inserted row for each",
                tied_groups
            );
        }

        let mut stmt = conn.prepare_cached(&format!(
            "{}
             SELECT c.id, c.name, c.description,
                    AVG(r.stars) AS average_stars,
                    COUNT(r.id) AS total_reviews
             FROM latest_rows lr
             JOIN review_history r ON r.id = lr.id
             JOIN category c ON c.id = r.category_id
             GROUP BY c.id, c.name, c.description
             ORDER BY average_stars DESC, c.id ASC
             LIMIT ?1",
            LATEST_REVISIONS_CTE
        ))?;
        let trends = stmt
            .query_map(params![limit as i64], |row| {
                let average: f64 = row.get("average_stars")?;
                Ok(CategoryTrend {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    description: row.get("description")?,
                    average_stars: round_to_cents(average),
                    total_reviews: row.get("total_reviews")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trends)
    }

    fn append_access_log(&self, text: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO access_log (text, created_at) VALUES (?1, ?2)",
            params![text, format_timestamp(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_access_log_entries(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM access_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review_store::TRENDS_LIMIT;
    use chrono::Duration;
    use tempfile::TempDir;

    fn new_review(review_id: &str, stars: i64, category_id: i64) -> NewReview {
        NewReview {
            text: Some(format!("review {}", review_id)),
            stars,
            review_id: review_id.to_string(),
            category_id,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn creates_categories_with_distinct_names() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "Paper").unwrap();
        let games = store.create_category("Games", "Fun").unwrap();

        assert_ne!(books.id, games.id);
        assert_eq!(store.get_category(books.id).unwrap(), Some(books.clone()));
        assert_eq!(store.list_categories().unwrap(), vec![books, games]);
    }

    #[test]
    fn rejects_category_names_differing_only_in_case() {
        let store = SqliteReviewStore::in_memory().unwrap();
        store.create_category("Electronics", "Devices").unwrap();

        let err = store.create_category("eLeCtRoNiCs", "Other").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store.create_category("  ELECTRONICS ", "Other").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(store.list_categories().unwrap().len(), 1);
    }

    #[test]
    fn review_for_missing_category_is_not_persisted() {
        let store = SqliteReviewStore::in_memory().unwrap();

        let err = store.create_review(&new_review("r1", 5, 99)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list_reviews(None).unwrap().is_empty());
    }

    #[test]
    fn created_review_has_no_labels() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let category = store.create_category("Books", "").unwrap();

        let review = store.create_review(&new_review("r1", 4, category.id)).unwrap();
        assert_eq!(review.tone, None);
        assert_eq!(review.sentiment, None);
        assert_eq!(review.created_at, review.updated_at);
        assert_eq!(store.get_review(review.id).unwrap(), Some(review));
    }

    #[test]
    fn lists_reviews_newest_first_and_filters_by_category() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "").unwrap();
        let games = store.create_category("Games", "").unwrap();

        let first = store
            .insert_review(&new_review("a", 1, books.id), t0())
            .unwrap();
        let second = store
            .insert_review(&new_review("b", 2, games.id), t0() + Duration::minutes(1))
            .unwrap();
        let third = store
            .insert_review(&new_review("c", 3, books.id), t0() + Duration::minutes(2))
            .unwrap();

        let all: Vec<i64> = store.list_reviews(None).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![third.id, second.id, first.id]);

        let only_books: Vec<i64> = store
            .list_reviews(Some(books.id))
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(only_books, vec![third.id, first.id]);
    }

    #[test]
    fn setting_labels_twice_keeps_last_write() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let category = store.create_category("Books", "").unwrap();
        let review = store
            .insert_review(&new_review("r1", 4, category.id), t0())
            .unwrap();

        let first = store.set_review_labels(review.id, "joyful", "positive").unwrap();
        assert!(first.updated_at > review.updated_at);

        let second = store.set_review_labels(review.id, "angry", "negative").unwrap();
        assert_eq!(second.tone.as_deref(), Some("angry"));
        assert_eq!(second.sentiment.as_deref(), Some("negative"));
        assert_eq!(store.list_reviews(None).unwrap().len(), 1);
    }

    #[test]
    fn setting_labels_on_missing_review_is_not_found() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let err = store.set_review_labels(7, "calm", "neutral").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn lists_reviews_missing_either_label() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let category = store.create_category("Books", "").unwrap();
        let a = store.create_review(&new_review("a", 1, category.id)).unwrap();
        let b = store.create_review(&new_review("b", 2, category.id)).unwrap();
        let c = store.create_review(&new_review("c", 3, category.id)).unwrap();
        store.set_review_labels(b.id, "calm", "neutral").unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE review_history SET tone = 'calm' WHERE id = ?1",
                params![c.id],
            )
            .unwrap();
        }

        assert_eq!(store.list_unprocessed_review_ids().unwrap(), vec![a.id, c.id]);
    }

    #[test]
    fn trends_use_only_the_latest_revision() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "Paper").unwrap();

        store
            .insert_review(&new_review("r1", 2, books.id), t0())
            .unwrap();
        store
            .insert_review(&new_review("r1", 8, books.id), t0() + Duration::hours(1))
            .unwrap();
        store
            .insert_review(&new_review("r2", 5, books.id), t0())
            .unwrap();

        let trends = store.get_category_trends(TRENDS_LIMIT).unwrap();
        assert_eq!(
            trends,
            vec![CategoryTrend {
                id: books.id,
                name: "Books".to_string(),
                description: "Paper".to_string(),
                average_stars: 6.5,
                total_reviews: 2,
            }]
        );
    }

    #[test]
    fn trends_are_sorted_limited_and_skip_empty_categories() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..7 {
            let category = store.create_category(&format!("Category {}", i), "").unwrap();
            ids.push(category.id);
            store
                .insert_review(&new_review(&format!("r{}", i), i, category.id), t0())
                .unwrap();
        }
        store.create_category("Empty", "").unwrap();

        let trends = store.get_category_trends(TRENDS_LIMIT).unwrap();
        assert_eq!(trends.len(), TRENDS_LIMIT);
        let averages: Vec<f64> = trends.iter().map(|t| t.average_stars).collect();
        assert_eq!(averages, vec![6.0, 5.0, 4.0, 3.0, 2.0]);
        assert!(trends.iter().all(|t| t.name != "Empty"));
    }

    #[test]
    fn trends_round_average_to_two_decimals() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "").unwrap();
        for (key, stars) in [("a", 1), ("b", 1), ("c", 2)] {
            store
                .insert_review(&new_review(key, stars, books.id), t0())
                .unwrap();
        }

        let trends = store.get_category_trends(TRENDS_LIMIT).unwrap();
        assert_eq!(trends[0].average_stars, 1.33);
        assert_eq!(trends[0].total_reviews, 3);
    }

    #[test]
    fn tied_revisions_resolve_to_last_inserted_row() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "").unwrap();
        store
            .insert_review(&new_review("r1", 1, books.id), t0())
            .unwrap();
        store
            .insert_review(&new_review("r1", 9, books.id), t0())
            .unwrap();

        let trends = store.get_category_trends(TRENDS_LIMIT).unwrap();
        assert_eq!(trends[0].average_stars, 9.0);
        assert_eq!(trends[0].total_reviews, 1);
    }

    #[test]
    fn revisions_moving_between_categories_count_only_where_latest() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let books = store.create_category("Books", "").unwrap();
        let games = store.create_category("Games", "").unwrap();
        store
            .insert_review(&new_review("r1", 3, books.id), t0())
            .unwrap();
        store
            .insert_review(&new_review("r1", 7, games.id), t0() + Duration::seconds(1))
            .unwrap();

        let trends = store.get_category_trends(TRENDS_LIMIT).unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].id, games.id);
    }

    #[test]
    fn appends_access_log_entries() {
        let store = SqliteReviewStore::in_memory().unwrap();
        store.append_access_log("GET /reviews/trends").unwrap();
        store.append_access_log("GET /reviews/").unwrap();
        assert_eq!(store.count_access_log_entries().unwrap(), 2);
    }

    #[test]
    fn reopens_existing_database_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("reviews.db");
        {
            let store = SqliteReviewStore::new(&db_path).unwrap();
            store.create_category("Books", "Paper").unwrap();
        }

        let store = SqliteReviewStore::new(&db_path).unwrap();
        assert_eq!(store.list_categories().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_timestamp_surfaces_as_persistence_error() {
        let store = SqliteReviewStore::in_memory().unwrap();
        let category = store.create_category("Books", "").unwrap();
        let review = store.create_review(&new_review("r1", 4, category.id)).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE review_history SET created_at = 'yesterday' WHERE id = ?1",
                params![review.id],
            )
            .unwrap();

        let err = store.get_review(review.id).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)), "{:?}", err);
        assert!(err.to_string().contains("yesterday"));
    }
}
