//! SQLite schema for the review database.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, SqlType, Table, VersionedSchema};

const CATEGORY_TABLE: Table = Table {
    name: "category",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        // trimmed, lower-cased name; carries the case-insensitive uniqueness
        sqlite_column!("name_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

const CATEGORY_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "category",
    foreign_column: "id",
};

const REVIEW_HISTORY_TABLE: Table = Table {
    name: "review_history",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("text", &SqlType::Text),
        sqlite_column!("stars", &SqlType::Integer, non_null = true),
        sqlite_column!("review_id", &SqlType::Text, non_null = true),
        sqlite_column!("tone", &SqlType::Text),
        sqlite_column!("sentiment", &SqlType::Text),
        sqlite_column!(
            "category_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&CATEGORY_FOREIGN_KEY)
        ),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        (
            "idx_review_history_review_id_created",
            "review_id, created_at DESC",
        ),
        ("idx_review_history_category_id", "category_id"),
    ],
};

const ACCESS_LOG_TABLE: Table = Table {
    name: "access_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("text", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const REVIEW_DB_SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[CATEGORY_TABLE, REVIEW_HISTORY_TABLE, ACCESS_LOG_TABLE],
};
