//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod job;
pub mod pool;
pub mod profile;
pub mod summary;
pub mod turn;

use chrono::{DateTime, SecondsFormat, Utc};
use mnemo_types::error::RepositoryError;

/// Timestamps are stored as fixed-width RFC 3339 text so that string
/// order matches time order (`MAX(created_at)` relies on it).
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}
