//! Limiter statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide limiter statistics, shared by every actor
pub struct LimiterStats {
    /// Checks admitted
    pub admitted: AtomicU64,
    /// Checks rejected for lack of tokens
    pub rejected: AtomicU64,
    /// Checks whose cost exceeded capacity
    pub impossible: AtomicU64,
    /// Failed writes or deletes
    pub persist_failures: AtomicU64,
    /// Failed cold-start reads
    pub load_failures: AtomicU64,
    /// Alarms that found recent activity
    pub alarms_rearmed: AtomicU64,
    /// Idle buckets erased
    pub buckets_purged: AtomicU64,
    /// Actors started
    pub actors_spawned: AtomicU64,
    /// Actors removed from the registry after a purge
    pub actors_evicted: AtomicU64,
}

impl LimiterStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            impossible: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            alarms_rearmed: AtomicU64::new(0),
            buckets_purged: AtomicU64::new(0),
            actors_spawned: AtomicU64::new(0),
            actors_evicted: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> LimiterStatsSnapshot {
        LimiterStatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            impossible: self.impossible.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            alarms_rearmed: self.alarms_rearmed.load(Ordering::Relaxed),
            buckets_purged: self.buckets_purged.load(Ordering::Relaxed),
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_evicted: self.actors_evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for LimiterStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`LimiterStats`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LimiterStatsSnapshot {
    /// Checks admitted
    pub admitted: u64,
    /// Checks rejected for lack of tokens
    pub rejected: u64,
    /// Checks whose cost exceeded capacity
    pub impossible: u64,
    /// Failed writes or deletes
    pub persist_failures: u64,
    /// Failed cold-start reads
    pub load_failures: u64,
    /// Alarms that found recent activity
    pub alarms_rearmed: u64,
    /// Idle buckets erased
    pub buckets_purged: u64,
    /// Actors started
    pub actors_spawned: u64,
    /// Actors removed from the registry after a purge
    pub actors_evicted: u64,
}
