//! Upload correlation records.
//!
//! The scanning API only knows an upload ID. When its webhook fires, the
//! record written at upload time maps that ID back to the stored object.

use rusqlite::OptionalExtension;
use serde::Serialize;

use super::{is_valid_table_name, quote_ident, DbPool};
use crate::error::{DlpGateError, Result};

/// Maps a scan's upload ID to the object it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationRecord {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
}

/// Correlation table accessor over the shared pool.
#[derive(Clone)]
pub struct CorrelationStore {
    pool: DbPool,
    table: String,
    ident: String,
}

impl CorrelationStore {
    /// Bind to `table`, creating it if needed.
    pub fn new(pool: DbPool, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(DlpGateError::Config(format!(
                "'{}' is not a valid table name",
                table
            )));
        }
        let ident = quote_ident(table);
        let conn = pool.get()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {ident} (
                upload_id  TEXT PRIMARY KEY,
                bucket     TEXT NOT NULL,
                key        TEXT NOT NULL,
                created_at TEXT NOT NULL
            );"
        ))?;
        drop(conn);
        Ok(Self {
            pool,
            table: table.to_string(),
            ident,
        })
    }

    /// Store a record, replacing any previous one for the same upload ID.
    pub fn put(&self, record: &CorrelationRecord) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (upload_id, bucket, key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                self.ident
            ),
            rusqlite::params![
                record.upload_id,
                record.bucket,
                record.key,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up the record for `upload_id`.
    pub fn get(&self, upload_id: &str) -> Result<Option<CorrelationRecord>> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT upload_id, bucket, key FROM {} WHERE upload_id = ?1",
                    self.ident
                ),
                rusqlite::params![upload_id],
                |row| {
                    Ok(CorrelationRecord {
                        upload_id: row.get(0)?,
                        bucket: row.get(1)?,
                        key: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}
