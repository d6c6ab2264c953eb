//! Counter metrics for pipeline events.
//!
//! Every handler reports what it did as a single-dimension [`Metric`] through a
//! [`MetricsSink`]. The bundled [`SqliteMetrics`] sink appends each data point
//! to the `metrics` table; [`query_totals`] aggregates them per metric and
//! dimension for the CLI and the `/api/metrics` endpoint.
//!
//! The [`export`] submodule provides JSON and CSV export of all data points.

pub mod export;

use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::store::DbPool;

pub const TIMES_SCANNED: &str = "TimesScanned";
pub const TIMES_FLAGGED: &str = "TimesFlagged";
pub const TIMES_FOUND_SENSITIVE_DATA: &str = "TimesFoundSensitiveData";
pub const TIMES_ACCESS_CONTROLLED: &str = "TimesAccessControlled";
pub const TIMES_FILTERED: &str = "TimesFiltered";

/// A single counter data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub namespace: String,
    pub name: String,
    pub dimension_name: String,
    pub dimension_value: String,
    pub value: f64,
    pub unit: String,
}

impl Metric {
    /// A count of one, the only kind of data point the pipeline emits.
    pub fn count(
        namespace: &str,
        name: &str,
        dimension_name: &str,
        dimension_value: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            dimension_name: dimension_name.to_string(),
            dimension_value: dimension_value.to_string(),
            value: 1.0,
            unit: "Count".to_string(),
        }
    }
}

/// Destination for metric data points.
pub trait MetricsSink: Send + Sync {
    fn put_metric(&self, metric: &Metric) -> Result<()>;
}

/// Record `metric`, logging instead of failing when the sink errors.
pub fn emit(sink: &dyn MetricsSink, metric: Metric) {
    if let Err(e) = sink.put_metric(&metric) {
        warn!("Failed to record metric {}: {}", metric.name, e);
    }
}

/// Sink that appends data points to the `metrics` table.
#[derive(Clone)]
pub struct SqliteMetrics {
    pool: DbPool,
}

impl SqliteMetrics {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl MetricsSink for SqliteMetrics {
    fn put_metric(&self, metric: &Metric) -> Result<()> {
        let conn = self.pool.get()?;
        record(&conn, metric, &chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }
}

/// A stored data point as read back from the `metrics` table.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub id: i64,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    pub metric: Metric,
}

/// Insert a data point with an explicit timestamp.
pub fn record(conn: &Connection, metric: &Metric, timestamp: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO metrics (timestamp, namespace, name, dimension_name, dimension_value, value, unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            timestamp,
            metric.namespace,
            metric.name,
            metric.dimension_name,
            metric.dimension_value,
            metric.value,
            metric.unit,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Query the most recent N data points, newest first.
pub fn query_recent(conn: &Connection, limit: usize) -> Result<Vec<MetricRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, namespace, name, dimension_name, dimension_value, value, unit
         FROM metrics ORDER BY id DESC LIMIT ?1",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map(rusqlite::params![limit], |row| {
        Ok(MetricRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            metric: Metric {
                namespace: row.get(2)?,
                name: row.get(3)?,
                dimension_name: row.get(4)?,
                dimension_value: row.get(5)?,
                value: row.get(6)?,
                unit: row.get(7)?,
            },
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Sum of one metric for one dimension value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTotal {
    pub name: String,
    pub dimension_name: String,
    pub dimension_value: String,
    pub total: f64,
}

/// Aggregate data points with `SUM(value) GROUP BY` name and dimension.
pub fn query_totals(conn: &Connection) -> Result<Vec<MetricTotal>> {
    let mut stmt = conn.prepare(
        "SELECT name, dimension_name, dimension_value, SUM(value)
         FROM metrics
         GROUP BY name, dimension_name, dimension_value
         ORDER BY name, dimension_value",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MetricTotal {
            name: row.get(0)?,
            dimension_name: row.get(1)?,
            dimension_value: row.get(2)?,
            total: row.get(3)?,
        })
    })?;

    let mut totals = Vec::new();
    for row in rows {
        totals.push(row?);
    }
    Ok(totals)
}
