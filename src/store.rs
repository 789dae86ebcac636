//! Bucket storage trait

use crate::{BucketState, StoreError};
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable per-key storage for bucket rows and cleanup alarms.
///
/// Every key is read and written only by that key's actor, so backends need
/// per-call atomicity but no cross-call transactions.
pub trait BucketStore: Send + Sync + 'static {
    /// Bucket row for `key`, if any
    fn load(&self, key: &str) -> Result<Option<BucketState>, StoreError>;
    /// Replace the bucket row
    fn save(&self, key: &str, state: &BucketState) -> Result<(), StoreError>;
    /// Pending alarm deadline (epoch millis)
    fn load_alarm(&self, key: &str) -> Result<Option<u64>, StoreError>;
    /// Replace the alarm deadline
    fn save_alarm(&self, key: &str, at_millis: u64) -> Result<(), StoreError>;
    /// Erase the bucket row and the alarm row
    fn delete_all(&self, key: &str) -> Result<(), StoreError>;
    /// Keys with a pending alarm, used to resume cleanup after restart
    fn alarm_keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Default)]
struct Rows {
    buckets: HashMap<Box<str>, BucketState>,
    alarms: HashMap<Box<str>, u64>,
}

/// In-memory store for tests and single-process deployments
pub struct InMemoryStore {
    data: RwLock<Rows>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Rows::default()),
        }
    }

    /// Number of stored bucket rows
    pub fn bucket_count(&self) -> usize {
        self.data.read().map(|d| d.buckets.len()).unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string().into())
}

impl BucketStore for InMemoryStore {
    fn load(&self, key: &str) -> Result<Option<BucketState>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.buckets.get(key).copied())
    }

    fn save(&self, key: &str, state: &BucketState) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.buckets.insert(key.into(), *state);
        Ok(())
    }

    fn load_alarm(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.alarms.get(key).copied())
    }

    fn save_alarm(&self, key: &str, at_millis: u64) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.alarms.insert(key.into(), at_millis);
        Ok(())
    }

    fn delete_all(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.buckets.remove(key);
        data.alarms.remove(key);
        Ok(())
    }

    fn alarm_keys(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.alarms.keys().map(|k| k.to_string()).collect())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_keyed_independently() {
        let store = InMemoryStore::new();
        store.save("1.2.3.4:comments", &BucketState::full(5, 10)).unwrap();
        store.save_alarm("1.2.3.4:comments", 99).unwrap();

        assert_eq!(store.load("1.2.3.4:comments").unwrap(), Some(BucketState::full(5, 10)));
        assert_eq!(store.load("1.2.3.4:other").unwrap(), None);
        assert_eq!(store.alarm_keys().unwrap(), vec!["1.2.3.4:comments".to_string()]);
    }

    #[test]
    fn test_delete_all_erases_bucket_and_alarm() {
        let store = InMemoryStore::new();
        store.save("k", &BucketState::full(5, 10)).unwrap();
        store.save_alarm("k", 99).unwrap();

        store.delete_all("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
        assert_eq!(store.load_alarm("k").unwrap(), None);
        assert_eq!(store.bucket_count(), 0);
    }
}
