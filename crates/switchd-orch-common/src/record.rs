//! Write-only record sink for ingested change records.
//!
//! When recording is enabled, every record entering a backlog is forwarded
//! to a sink before merging, so the exact ingest stream can be reproduced
//! from the log alone.

use crate::consumer::{FieldValue, KeyOpFieldsValues, Operation};
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// One recorded change record.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub timestamp: DateTime<Utc>,
    pub table: String,
    pub key: String,
    pub op: Operation,
    pub fvs: Vec<FieldValue>,
}

impl TaskRecord {
    pub fn new(table: &str, entry: &KeyOpFieldsValues) -> Self {
        Self {
            timestamp: Utc::now(),
            table: table.to_string(),
            key: entry.key.clone(),
            op: entry.op,
            fvs: entry.fvs.clone(),
        }
    }

    /// Serializes the record for log shipping.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "table": self.table,
            "key": self.key,
            "op": if self.op.is_set() { "SET" } else { "DEL" },
            "fvs": self.fvs
                .iter()
                .map(|(f, v)| serde_json::json!([f, v]))
                .collect::<Vec<_>>(),
        })
    }
}

/// A write-only destination for task records.
pub trait RecordSink: Send + Sync {
    fn record(&self, record: TaskRecord);
}

/// A sink that ships records through the process log as JSON lines.
#[derive(Default)]
pub struct LogRecorder;

impl LogRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for LogRecorder {
    fn record(&self, record: TaskRecord) {
        log::info!("record: {}", record.to_json());
    }
}

/// A sink that keeps records in memory, for tests and diagnostics.
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<TaskRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

impl RecordSink for MemoryRecorder {
    fn record(&self, record: TaskRecord) {
        self.records.lock().unwrap().push(record);
    }
}
