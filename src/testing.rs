//! Test support: tracing setup and a fault-injecting store

use crate::{BucketState, BucketStore, InMemoryStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Install an env-filtered fmt subscriber once per process
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Store wrapper whose reads or writes can be switched to fail
pub struct FailingStore {
    inner: InMemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    /// Wrap `inner` with faults disabled
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make loads fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make saves and deletes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        Ok(())
    }
}

impl BucketStore for FailingStore {
    fn load(&self, key: &str) -> Result<Option<BucketState>, StoreError> {
        self.check_read()?;
        self.inner.load(key)
    }

    fn save(&self, key: &str, state: &BucketState) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.save(key, state)
    }

    fn load_alarm(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.check_read()?;
        self.inner.load_alarm(key)
    }

    fn save_alarm(&self, key: &str, at_millis: u64) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.save_alarm(key, at_millis)
    }

    fn delete_all(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.delete_all(key)
    }

    fn alarm_keys(&self) -> Result<Vec<String>, StoreError> {
        self.check_read()?;
        self.inner.alarm_keys()
    }
}

#[cfg(test)]
pub(crate) fn test_env(
    store: std::sync::Arc<dyn BucketStore>,
    persist_mode: crate::PersistMode,
) -> std::sync::Arc<crate::actor::ActorEnv> {
    init_tracing();
    std::sync::Arc::new(crate::actor::ActorEnv {
        store,
        clock: std::sync::Arc::new(crate::TokioClock::anchored_at(1_700_000_000_000)),
        cleanup: crate::CleanupPolicy::default(),
        persist_mode,
        mailbox_capacity: crate::DEFAULT_MAILBOX_CAPACITY,
        observer: std::sync::Arc::new(crate::TracingObserver),
        stats: std::sync::Arc::new(crate::LimiterStats::new()),
    })
}
