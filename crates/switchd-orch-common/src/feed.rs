//! The ordered change-stream boundary.
//!
//! The core treats table storage and its notification transport as an
//! abstract feed of change records per table. [`MemoryFeed`] is the
//! in-process implementation the demo binary and test suites produce into.

use crate::consumer::{FieldValue, KeyOpFieldsValues, Operation};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// An ordered, per-table stream of change records.
///
/// `pop_batch` drains pending notifications; `get`/`get_keys` read the full
/// table state for reload and warm-restart bootstrap.
pub trait ChangeFeed: Send + Sync {
    /// The table this feed carries.
    fn table_name(&self) -> &str;

    /// Drains up to `max` pending change records, oldest first.
    fn pop_batch(&mut self, max: usize) -> Vec<KeyOpFieldsValues>;

    /// Reads the current field-values of a key, if present.
    fn get(&self, key: &str) -> Option<Vec<FieldValue>>;

    /// Lists all keys currently in the table.
    fn get_keys(&self) -> Vec<String>;
}

#[derive(Default)]
struct FeedInner {
    queue: VecDeque<KeyOpFieldsValues>,
    table: BTreeMap<String, Vec<FieldValue>>,
}

/// An in-memory change feed.
///
/// Clones share the same underlying stream, so a producer can keep a handle
/// while the consuming orch owns another.
#[derive(Clone)]
pub struct MemoryFeed {
    name: Arc<str>,
    inner: Arc<Mutex<FeedInner>>,
}

impl MemoryFeed {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(table_name.into()),
            inner: Arc::new(Mutex::new(FeedInner::default())),
        }
    }

    /// Publishes a change record: updates the table state and queues the
    /// notification.
    pub fn publish(&self, entry: KeyOpFieldsValues) {
        let mut inner = self.inner.lock().unwrap();
        match entry.op {
            Operation::Set => {
                inner.table.insert(entry.key.clone(), entry.fvs.clone());
            }
            Operation::Del => {
                inner.table.remove(&entry.key);
            }
        }
        inner.queue.push_back(entry);
    }

    /// Publishes a Set record.
    pub fn publish_set(&self, key: impl Into<String>, fvs: Vec<FieldValue>) {
        self.publish(KeyOpFieldsValues::set(key, fvs));
    }

    /// Publishes a Del record.
    pub fn publish_del(&self, key: impl Into<String>) {
        self.publish(KeyOpFieldsValues::del(key));
    }

    /// Number of queued, not-yet-popped notifications.
    pub fn queued(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

impl ChangeFeed for MemoryFeed {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn pop_batch(&mut self, max: usize) -> Vec<KeyOpFieldsValues> {
        let mut inner = self.inner.lock().unwrap();
        let take = max.min(inner.queue.len());
        inner.queue.drain(..take).collect()
    }

    fn get(&self, key: &str) -> Option<Vec<FieldValue>> {
        self.inner.lock().unwrap().table.get(key).cloned()
    }

    fn get_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().table.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_publish_and_pop() {
        let feed = MemoryFeed::new("NEIGH_TABLE");
        feed.publish_set("Ethernet0:10.0.0.1", vec![("neigh".into(), "aa:bb:cc:dd:ee:01".into())]);
        feed.publish_del("Ethernet0:10.0.0.1");

        let mut consumer_side = feed.clone();
        let batch = consumer_side.pop_batch(10);
        assert_eq!(batch.len(), 2);
        assert!(batch[0].op.is_set());
        assert!(batch[1].op.is_del());
        assert_eq!(feed.queued(), 0);
    }

    #[test]
    fn test_pop_batch_is_bounded() {
        let mut feed = MemoryFeed::new("T");
        for i in 0..5 {
            feed.publish_set(format!("k{}", i), vec![]);
        }
        assert_eq!(feed.pop_batch(2).len(), 2);
        assert_eq!(feed.pop_batch(10).len(), 3);
    }

    #[test]
    fn test_refill_rebuilds_backlog_from_table() {
        use crate::{Consumer, ConsumerConfig};

        let mut feed = MemoryFeed::new("INTF_TABLE");
        feed.publish_set("Ethernet0", vec![("mtu".into(), "9100".into())]);
        feed.publish_set("Ethernet4", vec![]);
        feed.publish_del("Ethernet4");

        // A restarted consumer missed the notifications
        feed.pop_batch(10);
        let mut consumer = Consumer::new(ConsumerConfig::new("INTF_TABLE"));
        assert_eq!(consumer.refill_from(&feed), 1);

        // Only live table state comes back, as Set entries
        assert_eq!(consumer.pending_count(), 1);
        let entry = consumer.front("Ethernet0").unwrap();
        assert!(entry.op.is_set());
        assert_eq!(entry.get_field("mtu"), Some("9100"));
    }

    #[test]
    fn test_table_state_tracks_latest() {
        let feed = MemoryFeed::new("T");
        feed.publish_set("k", vec![("f".into(), "1".into())]);
        feed.publish_set("k", vec![("f".into(), "2".into())]);

        assert_eq!(feed.get("k"), Some(vec![("f".into(), "2".into())]));
        assert_eq!(feed.get_keys(), vec!["k"]);

        feed.publish_del("k");
        assert_eq!(feed.get("k"), None);
        assert!(feed.get_keys().is_empty());
    }
}
