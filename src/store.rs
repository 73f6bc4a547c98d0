//! In-memory key-value storage for a single shard node.
//!
//! The store is a pure accelerator over the write-ahead log: it never touches
//! the disk itself. Startup replays the log into it via [`KvStore::recover`],
//! and every later mutation arrives through the node's write path, which
//! appends to the log first.

use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe key-value map shared by all request handlers on a node.
///
/// # Why RwLock instead of Mutex?
///
/// Reads (GET) dominate this workload and take no other locks, so letting
/// them run concurrently is a free win. Writers are already serialized by the
/// WAL mutex in the node's write path; the write lock here only covers the
/// map insert itself.
#[derive(Default)]
pub struct KvStore {
    data: RwLock<HashMap<String, String>>,
}

impl KvStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Retrieves the current value for a key, or `None` if the key was never
    /// set or has been deleted.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().unwrap().get(key).cloned()
    }

    /// Stores a key-value pair, overwriting any existing value.
    pub fn set(&self, key: String, value: String) {
        self.data.write().unwrap().insert(key, value);
    }

    /// Removes a key. Returns `true` if the key was present.
    pub fn delete(&self, key: &str) -> bool {
        self.data.write().unwrap().remove(key).is_some()
    }

    /// Number of live keys, reported by `/status`.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk-applies replayed log records in order, last write per key winning.
    ///
    /// Runs once at startup before the listener starts, so `&mut self` gives
    /// us direct access without lock traffic.
    pub fn recover(&mut self, records: impl IntoIterator<Item = crate::wal::Record>) {
        let data = self.data.get_mut().unwrap();
        for record in records {
            match record.op {
                crate::wal::Op::Set => {
                    data.insert(record.key, record.value);
                }
                crate::wal::Op::Del => {
                    data.remove(&record.key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::Record;

    #[test]
    fn set_then_get_returns_value() {
        let store = KvStore::new();
        store.set("user".into(), "alice".into());
        assert_eq!(store.get("user"), Some("alice".into()));
    }

    #[test]
    fn last_write_wins() {
        let store = KvStore::new();
        store.set("k".into(), "one".into());
        store.set("k".into(), "two".into());
        assert_eq!(store.get("k"), Some("two".into()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = KvStore::new();
        assert_eq!(store.get("nope"), None);
    }

    #[test]
    fn delete_removes_key() {
        let store = KvStore::new();
        store.set("k".into(), "v".into());
        assert!(store.delete("k"));
        assert_eq!(store.get("k"), None);
        assert!(!store.delete("k"));
    }

    #[test]
    fn recover_applies_records_in_order() {
        let mut store = KvStore::new();
        store.recover(vec![
            Record::set("a", "1"),
            Record::set("b", "2"),
            Record::set("a", "3"),
            Record::del("b"),
        ]);
        assert_eq!(store.get("a"), Some("3".into()));
        assert_eq!(store.get("b"), None);
        assert_eq!(store.len(), 1);
    }
}
