use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use super::MetricRecord;

#[derive(Debug, Serialize)]
struct MetricEntry<'a> {
    id: i64,
    timestamp: &'a str,
    namespace: &'a str,
    name: &'a str,
    dimension_name: &'a str,
    dimension_value: &'a str,
    value: f64,
    unit: &'a str,
}

impl<'a> From<&'a MetricRecord> for MetricEntry<'a> {
    fn from(record: &'a MetricRecord) -> Self {
        MetricEntry {
            id: record.id,
            timestamp: &record.timestamp,
            namespace: &record.metric.namespace,
            name: &record.metric.name,
            dimension_name: &record.metric.dimension_name,
            dimension_value: &record.metric.dimension_value,
            value: record.metric.value,
            unit: &record.metric.unit,
        }
    }
}

/// Export all data points as a JSON string.
pub fn export_json(conn: &Connection) -> Result<String> {
    let records = super::query_recent(conn, usize::MAX)?;
    let entries: Vec<MetricEntry> = records.iter().map(MetricEntry::from).collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Export all data points as a CSV string.
pub fn export_csv(conn: &Connection) -> Result<String> {
    let records = super::query_recent(conn, usize::MAX)?;
    let mut output =
        String::from("id,timestamp,namespace,name,dimension_name,dimension_value,value,unit\n");
    for r in &records {
        output.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            r.id,
            r.timestamp,
            csv_field(&r.metric.namespace),
            csv_field(&r.metric.name),
            csv_field(&r.metric.dimension_name),
            csv_field(&r.metric.dimension_value),
            r.metric.value,
            csv_field(&r.metric.unit),
        ));
    }
    Ok(output)
}

/// Quote a field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
