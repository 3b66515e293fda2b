//! The stats-collection table boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use switchd_orch_common::FieldValue;

/// Write interface of the stats-collection service.
///
/// `set_group` configures group-level polling; `register`/`unregister`
/// manage per-object counter id lists; the name and type maps let the
/// poller resolve object ids back to human-readable names.
pub trait CounterStore: Send + Sync {
    fn set_group(&self, group: &str, fields: Vec<FieldValue>);
    fn register(&self, key: &str, fields: Vec<FieldValue>);
    fn unregister(&self, key: &str);
    fn set_name_map(&self, name: &str, id: &str);
    fn del_name_map(&self, name: &str);
    fn set_type_map(&self, id: &str, object_type: &str);
    fn del_type_map(&self, id: &str);
}

#[derive(Default)]
struct StoreInner {
    groups: HashMap<String, Vec<FieldValue>>,
    counters: HashMap<String, Vec<FieldValue>>,
    name_map: HashMap<String, String>,
    type_map: HashMap<String, String>,
}

/// In-memory counter store for the demo binary and tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    inner: Mutex<StoreInner>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, group: &str) -> Option<Vec<FieldValue>> {
        self.inner.lock().unwrap().groups.get(group).cloned()
    }

    pub fn counter(&self, key: &str) -> Option<Vec<FieldValue>> {
        self.inner.lock().unwrap().counters.get(key).cloned()
    }

    pub fn registered_count(&self) -> usize {
        self.inner.lock().unwrap().counters.len()
    }

    pub fn name_of(&self, name: &str) -> Option<String> {
        self.inner.lock().unwrap().name_map.get(name).cloned()
    }

    pub fn type_of(&self, id: &str) -> Option<String> {
        self.inner.lock().unwrap().type_map.get(id).cloned()
    }
}

impl CounterStore for MemoryCounterStore {
    fn set_group(&self, group: &str, fields: Vec<FieldValue>) {
        self.inner
            .lock()
            .unwrap()
            .groups
            .insert(group.to_string(), fields);
    }

    fn register(&self, key: &str, fields: Vec<FieldValue>) {
        self.inner
            .lock()
            .unwrap()
            .counters
            .insert(key.to_string(), fields);
    }

    fn unregister(&self, key: &str) {
        self.inner.lock().unwrap().counters.remove(key);
    }

    fn set_name_map(&self, name: &str, id: &str) {
        self.inner
            .lock()
            .unwrap()
            .name_map
            .insert(name.to_string(), id.to_string());
    }

    fn del_name_map(&self, name: &str) {
        self.inner.lock().unwrap().name_map.remove(name);
    }

    fn set_type_map(&self, id: &str, object_type: &str) {
        self.inner
            .lock()
            .unwrap()
            .type_map
            .insert(id.to_string(), object_type.to_string());
    }

    fn del_type_map(&self, id: &str) {
        self.inner.lock().unwrap().type_map.remove(id);
    }
}
