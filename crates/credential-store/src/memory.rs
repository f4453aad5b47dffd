//! In-process backend.

use crate::{KeyValueStore, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Map-backed store. Nothing survives the process; used for tests and
/// sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        let mut data = self.data.lock();
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[&str]) -> StorageResult<()> {
        let mut data = self.data.lock();
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_apply_together() {
        let store = MemoryStore::new();
        store
            .set_many(&[("erp_access_token", "a"), ("erp_refresh_token", "r")])
            .unwrap();
        assert_eq!(store.get("erp_access_token").unwrap().as_deref(), Some("a"));
        assert!(store.has("erp_refresh_token").unwrap());

        store
            .delete_many(&["erp_access_token", "erp_refresh_token", "missing"])
            .unwrap();
        assert_eq!(store.get("erp_access_token").unwrap(), None);
        assert!(!store.has("erp_refresh_token").unwrap());
    }

    #[test]
    fn test_delete_reports_presence() {
        let store = MemoryStore::new();
        store.set("erp_user", "{}").unwrap();
        assert!(store.delete("erp_user").unwrap());
        assert!(!store.delete("erp_user").unwrap());
    }
}
