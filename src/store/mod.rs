//! SQLite-backed local state.
//!
//! A single database file holds the three tables the pipeline needs:
//! object tags (read by the access-control and redaction handlers), metric
//! data points, and the upload correlation table (see [`correlation`]).
//! The database is accessed through an [`r2d2`] connection pool ([`DbPool`])
//! so async handlers can borrow a connection without a global lock.

pub mod correlation;

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub use correlation::{CorrelationRecord, CorrelationStore};

/// SQLite connection pool type alias (r2d2 + r2d2-sqlite).
pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

/// Open a connection pool for the given database file path.
///
/// Creates the database and the shared tables if they don't exist.
/// The pool is configured with a maximum of 4 connections.
pub fn open_pool(path: &Path) -> Result<DbPool> {
    let manager = r2d2_sqlite::SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder().max_size(4).build(manager)?;
    init_db(&*pool.get()?)?;
    Ok(pool)
}

/// Open an in-memory connection pool (for testing).
///
/// Limited to one connection: every in-memory SQLite connection is its own
/// database.
pub fn open_memory_pool() -> Result<DbPool> {
    let manager = r2d2_sqlite::SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    init_db(&*pool.get()?)?;
    Ok(pool)
}

/// Create the tag and metric tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS object_tags (
            bucket    TEXT NOT NULL,
            key       TEXT NOT NULL,
            position  INTEGER NOT NULL,
            tag_key   TEXT NOT NULL,
            tag_value TEXT NOT NULL,
            PRIMARY KEY (bucket, key, tag_key)
        );
        CREATE TABLE IF NOT EXISTS metrics (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       TEXT NOT NULL,
            namespace       TEXT NOT NULL,
            name            TEXT NOT NULL,
            dimension_name  TEXT NOT NULL,
            dimension_value TEXT NOT NULL,
            value           REAL NOT NULL,
            unit            TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name);",
    )?;
    Ok(())
}

/// Tables the store creates for itself; a correlation table may not reuse them.
const RESERVED_TABLES: [&str; 2] = ["object_tags", "metrics"];

/// Whether `name` is usable as the correlation table name.
///
/// Accepts the DynamoDB table-name alphabet (letters, digits, `_`, `-`, `.`)
/// and rejects the store's own tables and SQLite's `sqlite_` namespace.
pub fn is_valid_table_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !RESERVED_TABLES.contains(&lower.as_str())
        && !lower.starts_with("sqlite_")
}

/// Quote `name` as an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_pool_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("state.db")).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('object_tags', 'metrics')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn init_db_is_idempotent() {
        let pool = open_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn table_name_validation() {
        assert!(is_valid_table_name("uploads"));
        assert!(is_valid_table_name("_scan_records2"));
        assert!(is_valid_table_name("dlp-uploads"));
        assert!(is_valid_table_name("prod.dlp_uploads"));
        assert!(is_valid_table_name("2uploads"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("uploads;drop"));
        assert!(!is_valid_table_name("up\"loads"));
        assert!(!is_valid_table_name(&"a".repeat(256)));
    }

    #[test]
    fn store_tables_are_reserved() {
        assert!(!is_valid_table_name("metrics"));
        assert!(!is_valid_table_name("Object_Tags"));
        assert!(!is_valid_table_name("sqlite_master"));
    }

    #[test]
    fn identifiers_quoted() {
        assert_eq!(quote_ident("dlp-uploads"), "\"dlp-uploads\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
