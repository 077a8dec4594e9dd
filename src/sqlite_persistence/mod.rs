mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};

/// Timestamp format used for every stored date: fixed-width RFC 3339 in UTC
/// with microseconds, so lexical order in SQL equals chronological order.
pub fn format_timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .ok()
}
