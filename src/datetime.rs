//! Date/time helpers shared by the repositories and the web layer.
//!
//! SQLite stores timestamps as `YYYY-MM-DD HH:MM:SS` text in UTC
//! (`datetime('now')`). Cutoffs computed in Rust must use the same format so
//! that text comparison orders them correctly.

use chrono::{DateTime, Duration, Utc};

const SQLITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC instant the way SQLite's `datetime()` does.
pub fn to_sqlite(dt: &DateTime<Utc>) -> String {
    dt.format(SQLITE_FORMAT).to_string()
}

/// SQLite-formatted timestamp `age` before now.
pub fn sqlite_cutoff(age: Duration) -> String {
    to_sqlite(&(Utc::now() - age))
}

/// SQLite-formatted timestamp `ttl` after now.
pub fn sqlite_expiry(ttl: Duration) -> String {
    to_sqlite(&(Utc::now() + ttl))
}

/// Convert a database datetime string (YYYY-MM-DD HH:MM:SS) to RFC3339 format.
///
/// The database stores times in UTC, so 'Z' is appended.
pub fn to_rfc3339(datetime_str: &str) -> String {
    format!("{}Z", datetime_str.replace(' ', "T"))
}
