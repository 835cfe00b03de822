//! In-process store
//!
//! A `CacheStore` backed by a hash map, with a switch to simulate the
//! whole group being unreachable.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{CacheStore, Expiry};
use crate::error::{Error, Result};

/// In-memory server group
pub struct MemoryStore {
    name: String,
    entries: Mutex<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
    writes: AtomicUsize,
    last_expiry: Mutex<Option<Expiry>>,
}

impl MemoryStore {
    /// Create an empty, reachable store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
            last_expiry: Mutex::new(None),
        }
    }

    /// Mark the store reachable or down
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Expiry passed with the most recent successful write
    pub fn last_expiry(&self) -> Option<Expiry> {
        *self.last_expiry.lock()
    }

    /// Raw bytes under `key`, bypassing availability
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    /// Put raw bytes under `key` without counting a write
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.lock().insert(key.to_string(), value.into());
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ConnectionFailed {
                address: self.name.clone(),
                reason: "store is down".into(),
            })
        }
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8], expiry: Expiry) -> Result<()> {
        self.check_available()?;
        self.entries.lock().insert(key.to_string(), value.to_vec());
        *self.last_expiry.lock() = Some(expiry);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new("mem");
        assert!(store.get("k").unwrap().is_none());

        store.set("k", b"v", Expiry::After(60)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.last_expiry(), Some(Expiry::After(60)));
    }

    #[test]
    fn test_memory_store_down() {
        let store = MemoryStore::new("mem");
        store.set_available(false);

        assert!(store.get("k").unwrap_err().is_transient());
        assert!(store.set("k", b"v", Expiry::Never).is_err());
        assert_eq!(store.write_count(), 0);
        assert!(store.raw("k").is_none());
    }
}
