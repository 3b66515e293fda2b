//! Per-table pending-task backlog with merge semantics.

use crate::record::{RecordSink, TaskRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Operation carried by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Upsert (add or update)
    Set,
    /// Delete
    Del,
}

impl Operation {
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair from a table entry.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple: the unit of change consumed from
/// a table feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldsValues {
    /// The entity key (e.g., "Ethernet0", "Ethernet0:10.0.0.1/24")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if this entry has the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.fvs.iter().any(|(f, _)| f == field)
    }
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Table name (e.g., "INTF_TABLE", "NEIGH_TABLE")
    pub table_name: String,
    /// Pop batch size per ingest
    pub batch_size: usize,
}

impl ConsumerConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            batch_size: 128,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Pending-task backlog for one table.
///
/// A Consumer absorbs change records and coalesces them so that at most one
/// effective pending state exists per key, except for the documented
/// delete-then-upsert case:
///
/// - multiple Del for a key: only the latest is kept
/// - Set after a pending Set: field-values merge, newest value per field wins
/// - Del after anything: pending work for the key is discarded, the Del wins
/// - Set after an unconsumed Del: both are kept in arrival order, so the
///   handler observes the delete before the re-add
///
/// Distinct keys are handed to the handler in the order they were first
/// seen; merging never reorders keys relative to each other.
///
/// Handlers iterate with [`Consumer::pending_keys`] / [`Consumer::front`] and
/// call [`Consumer::remove_front`] once a task is applied. Leaving a task in
/// place is the retry mechanism: it is re-attempted on every future cycle
/// until it succeeds or a later Del supersedes it.
pub struct Consumer {
    config: ConsumerConfig,
    /// Pending tasks per key. Each queue holds one entry, or Del followed by
    /// Set.
    to_sync: HashMap<String, VecDeque<KeyOpFieldsValues>>,
    /// Keys in first-seen order.
    order: VecDeque<String>,
    pending_count: usize,
    recorder: Option<Arc<dyn RecordSink>>,
}

impl Consumer {
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: HashMap::new(),
            order: VecDeque::new(),
            pending_count: 0,
            recorder: None,
        }
    }

    /// Attaches a write-only sink that receives every ingested record.
    pub fn set_recorder(&mut self, recorder: Arc<dyn RecordSink>) {
        self.recorder = Some(recorder);
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Applies a batch of change records in record order.
    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        if let Some(recorder) = &self.recorder {
            recorder.record(TaskRecord::new(&self.config.table_name, &entry));
        }

        if !self.to_sync.contains_key(&entry.key) {
            self.order.push_back(entry.key.clone());
        }
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                // A delete supersedes and resets any pending work for the key
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        // Coalesce: newest value per field wins, fields only
                        // present in the pending entry are preserved
                        for (field, value) in entry.fvs {
                            if let Some(existing) =
                                last.fvs.iter_mut().find(|(f, _)| *f == field)
                            {
                                existing.1 = value;
                            } else {
                                last.fvs.push((field, value));
                            }
                        }
                        return;
                    }
                }
                // Queue is empty or ends with an unconsumed Del
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Returns the pending keys in first-seen order.
    ///
    /// The returned snapshot stays valid while the handler removes entries,
    /// so a drain pass never skips or double-visits keys.
    pub fn pending_keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    /// Returns the next unconsumed entry for a key.
    pub fn front(&self, key: &str) -> Option<&KeyOpFieldsValues> {
        self.to_sync.get(key).and_then(|q| q.front())
    }

    /// Consumes the front entry for a key after the handler applied it.
    pub fn remove_front(&mut self, key: &str) -> Option<KeyOpFieldsValues> {
        let queue = self.to_sync.get_mut(key)?;
        let entry = queue.pop_front()?;
        self.pending_count -= 1;
        if queue.is_empty() {
            self.to_sync.remove(key);
            self.order.retain(|k| k != key);
        }
        Some(entry)
    }

    /// Iterates all pending entries in service order.
    pub fn iter_pending(&self) -> impl Iterator<Item = &KeyOpFieldsValues> {
        self.order
            .iter()
            .filter_map(|key| self.to_sync.get(key))
            .flat_map(|q| q.iter())
    }

    /// Rebuilds the backlog from a full table snapshot, for warm-restart
    /// bootstrap.
    pub fn refill_from(&mut self, feed: &dyn crate::ChangeFeed) -> usize {
        let mut count = 0;
        for key in feed.get_keys() {
            if let Some(fvs) = feed.get(&key) {
                self.add_single_entry(KeyOpFieldsValues::set(key, fvs));
                count += 1;
            }
        }
        count
    }

    /// Pops one bounded batch from a feed into the backlog. Returns the
    /// number of records ingested.
    pub fn ingest_from(&mut self, feed: &mut dyn crate::ChangeFeed) -> usize {
        let batch = feed.pop_batch(self.config.batch_size);
        let count = batch.len();
        self.add_to_sync(batch);
        count
    }

    pub fn clear(&mut self) {
        self.to_sync.clear();
        self.order.clear();
        self.pending_count = 0;
    }

    /// Dumps pending entries for diagnostics.
    pub fn dump(&self) -> Vec<String> {
        self.iter_pending()
            .map(|e| {
                format!(
                    "{}|{}|{:?}",
                    e.key,
                    if e.op.is_set() { "SET" } else { "DEL" },
                    e.fvs
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecorder;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn consumer() -> Consumer {
        Consumer::new(ConsumerConfig::new("TEST_TABLE"))
    }

    fn fv(field: &str, value: &str) -> FieldValue {
        (field.to_string(), value.to_string())
    }

    #[test]
    fn test_entry_accessors() {
        let entry = KeyOpFieldsValues::set("Ethernet0", vec![fv("mtu", "9100")]);
        assert_eq!(entry.get_field("mtu"), Some("9100"));
        assert!(entry.has_field("mtu"));
        assert!(!entry.has_field("speed"));
    }

    #[test]
    fn test_set_merge_latest_field_wins() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "Ethernet0",
            vec![fv("mtu", "9100"), fv("admin_status", "up")],
        )]);
        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "Ethernet0",
            vec![fv("mtu", "1500"), fv("vrf_name", "Vrf-red")],
        )]);

        assert_eq!(consumer.pending_count(), 1);
        let entry = consumer.front("Ethernet0").unwrap();
        assert_eq!(entry.get_field("mtu"), Some("1500"));
        assert_eq!(entry.get_field("admin_status"), Some("up"));
        assert_eq!(entry.get_field("vrf_name"), Some("Vrf-red"));
    }

    #[test]
    fn test_del_supersedes_set() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("Ethernet0", vec![fv("mtu", "9100")]),
            KeyOpFieldsValues::del("Ethernet0"),
        ]);

        assert_eq!(consumer.pending_count(), 1);
        assert!(consumer.front("Ethernet0").unwrap().op.is_del());
    }

    #[test]
    fn test_del_then_set_keeps_both_in_order() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("Ethernet0"),
            KeyOpFieldsValues::set("Ethernet0", vec![fv("mtu", "9100")]),
        ]);

        assert_eq!(consumer.pending_count(), 2);
        assert!(consumer.front("Ethernet0").unwrap().op.is_del());
        consumer.remove_front("Ethernet0");
        assert!(consumer.front("Ethernet0").unwrap().op.is_set());
    }

    #[test]
    fn test_set_after_del_then_set_merges_into_the_set() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("Ethernet0"),
            KeyOpFieldsValues::set("Ethernet0", vec![fv("mtu", "9100")]),
            KeyOpFieldsValues::set("Ethernet0", vec![fv("mtu", "1500")]),
        ]);

        // Still two entries: the Del, and one coalesced Set
        assert_eq!(consumer.pending_count(), 2);
        consumer.remove_front("Ethernet0");
        let entry = consumer.front("Ethernet0").unwrap();
        assert_eq!(entry.get_field("mtu"), Some("1500"));
    }

    #[test]
    fn test_first_seen_key_order_preserved() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("Ethernet8", vec![]),
            KeyOpFieldsValues::set("Ethernet0", vec![]),
            KeyOpFieldsValues::set("Ethernet4", vec![]),
            // Merging into Ethernet8 must not move it
            KeyOpFieldsValues::set("Ethernet8", vec![fv("mtu", "1500")]),
            // Nor does a delete reset a key's position
            KeyOpFieldsValues::del("Ethernet0"),
        ]);

        assert_eq!(
            consumer.pending_keys(),
            vec!["Ethernet8", "Ethernet0", "Ethernet4"]
        );
    }

    #[test]
    fn test_removal_in_place_during_iteration() {
        let mut consumer = consumer();
        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("a", vec![]),
            KeyOpFieldsValues::set("b", vec![]),
            KeyOpFieldsValues::set("c", vec![]),
        ]);

        // Handler applies "a" and "c", leaves "b" pending
        let mut visited = Vec::new();
        for key in consumer.pending_keys() {
            visited.push(key.clone());
            if key != "b" {
                consumer.remove_front(&key);
            }
        }

        assert_eq!(visited, vec!["a", "b", "c"]);
        assert_eq!(consumer.pending_keys(), vec!["b"]);
        assert_eq!(consumer.pending_count(), 1);
    }

    /// The retained state for any single-key sequence matches a naive
    /// "replay all, delete wins and resets, latest field wins" reducer,
    /// except that an unconsumed Del before a Set is kept alongside it.
    #[test]
    fn test_single_key_replay_equivalence() {
        let sequences: Vec<Vec<KeyOpFieldsValues>> = vec![
            vec![
                KeyOpFieldsValues::set("k", vec![fv("f", "1")]),
                KeyOpFieldsValues::set("k", vec![fv("f", "2"), fv("g", "1")]),
                KeyOpFieldsValues::set("k", vec![fv("g", "2")]),
            ],
            vec![
                KeyOpFieldsValues::set("k", vec![fv("f", "1")]),
                KeyOpFieldsValues::del("k"),
                KeyOpFieldsValues::del("k"),
            ],
            vec![
                KeyOpFieldsValues::del("k"),
                KeyOpFieldsValues::set("k", vec![fv("f", "1")]),
                KeyOpFieldsValues::set("k", vec![fv("f", "2")]),
            ],
        ];

        for records in sequences {
            let mut consumer = consumer();
            consumer.add_to_sync(records.clone());

            // Naive reducer over the same records
            let mut latest: Option<HashMap<String, String>> = None;
            for record in &records {
                match record.op {
                    Operation::Del => latest = None,
                    Operation::Set => {
                        let fields = latest.get_or_insert_with(HashMap::new);
                        for (f, v) in &record.fvs {
                            fields.insert(f.clone(), v.clone());
                        }
                    }
                }
            }

            // The final retained entry is the reducer's answer
            let retained: Vec<&KeyOpFieldsValues> = consumer.iter_pending().collect();
            match latest {
                None => {
                    assert_eq!(retained.len(), 1);
                    assert!(retained[0].op.is_del());
                }
                Some(fields) => {
                    let last = retained.last().unwrap();
                    assert!(last.op.is_set());
                    let got: HashMap<String, String> = last.fvs.iter().cloned().collect();
                    assert_eq!(got, fields);
                }
            }
        }
    }

    #[test]
    fn test_recorder_sees_every_record_in_order() {
        let recorder = Arc::new(MemoryRecorder::new());
        let mut consumer = consumer();
        consumer.set_recorder(recorder.clone());

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("k", vec![fv("f", "1")]),
            KeyOpFieldsValues::set("k", vec![fv("f", "2")]),
            KeyOpFieldsValues::del("k"),
        ]);

        // Merging collapses the backlog but never the record stream
        assert_eq!(consumer.pending_count(), 1);
        let records = recorder.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "k");
        assert!(records[0].op.is_set());
        assert!(records[2].op.is_del());
    }
}
