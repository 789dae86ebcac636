//! LMDB-backed bucket store (feature `lmdb`)

use crate::{BucketState, BucketStore, StoreError};
use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;

const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

/// Run a committing write off the async scheduler when the runtime allows it.
///
/// `block_in_place` panics on a current-thread runtime, so there the write
/// runs inline.
fn blocking_write<T>(write: impl FnOnce() -> T) -> T {
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}

/// Bucket rows and alarms in two named LMDB databases
pub struct HeedStore {
    env: Env,
    buckets: Database<Str, SerdeJson<BucketState>>,
    alarms: Database<Str, SerdeJson<u64>>,
}

impl HeedStore {
    /// Open or create the environment in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_map_size(dir, DEFAULT_MAP_SIZE)
    }

    /// Open with an explicit LMDB map size in bytes
    pub fn open_with_map_size(dir: impl AsRef<Path>, map_size: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Backend(e.to_string().into()))?;

        // SAFETY: each directory is opened by a single HeedStore per process.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(2).open(dir)? };

        let mut wtxn = env.write_txn()?;
        let buckets = env.create_database(&mut wtxn, Some("buckets"))?;
        let alarms = env.create_database(&mut wtxn, Some("alarms"))?;
        wtxn.commit()?;

        tracing::debug!(path = %dir.display(), "Opened bucket store");
        Ok(Self { env, buckets, alarms })
    }
}

impl BucketStore for HeedStore {
    fn load(&self, key: &str) -> Result<Option<BucketState>, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.buckets.get(&rtxn, key)?)
    }

    fn save(&self, key: &str, state: &BucketState) -> Result<(), StoreError> {
        blocking_write(|| -> Result<(), StoreError> {
            let mut wtxn = self.env.write_txn()?;
            self.buckets.put(&mut wtxn, key, state)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    fn load_alarm(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.alarms.get(&rtxn, key)?)
    }

    fn save_alarm(&self, key: &str, at_millis: u64) -> Result<(), StoreError> {
        blocking_write(|| -> Result<(), StoreError> {
            let mut wtxn = self.env.write_txn()?;
            self.alarms.put(&mut wtxn, key, &at_millis)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    fn delete_all(&self, key: &str) -> Result<(), StoreError> {
        blocking_write(|| -> Result<(), StoreError> {
            let mut wtxn = self.env.write_txn()?;
            self.buckets.delete(&mut wtxn, key)?;
            self.alarms.delete(&mut wtxn, key)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    fn alarm_keys(&self) -> Result<Vec<String>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut keys = Vec::new();
        for entry in self.alarms.iter(&rtxn)? {
            let (key, _) = entry?;
            keys.push(key.to_owned());
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HeedStore::open(dir.path()).unwrap();
            store.save("u1:comments", &BucketState { tokens: 2.5, last_refill_millis: 7 }).unwrap();
            store.save_alarm("u1:comments", 1_000).unwrap();
        }

        let store = HeedStore::open(dir.path()).unwrap();
        assert_eq!(
            store.load("u1:comments").unwrap(),
            Some(BucketState { tokens: 2.5, last_refill_millis: 7 })
        );
        assert_eq!(store.load_alarm("u1:comments").unwrap(), Some(1_000));
        assert_eq!(store.alarm_keys().unwrap(), vec!["u1:comments".to_string()]);

        store.delete_all("u1:comments").unwrap();
        assert_eq!(store.load("u1:comments").unwrap(), None);
        assert!(store.alarm_keys().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_limiter_over_heed_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(HeedStore::open(dir.path()).unwrap());
        let limiter = crate::RateLimiter::new(store.clone()).unwrap();
        let limit = crate::RateLimit::new(2, 3_600_000);

        assert!(limiter.check_limit("u2:uploads", limit).await.unwrap().allowed);
        assert!(limiter.check_limit("u2:uploads", limit).await.unwrap().allowed);
        assert!(!limiter.check_limit("u2:uploads", limit).await.unwrap().allowed);

        limiter.resolve("u2:uploads").snapshot().await.unwrap();
        let stored = store.load("u2:uploads").unwrap().unwrap();
        assert!(stored.tokens < 1.0);
        assert!(store.load_alarm("u2:uploads").unwrap().is_some());
    }
}
