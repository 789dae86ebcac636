//! Idle-cleanup alarms
//!
//! Each actor keeps at most one pending alarm. Admissions push it to
//! `now + threshold`; when it fires the actor asks [`CleanupPolicy::on_alarm`]
//! whether to purge or to wait for the remainder of the window.

use crate::BucketState;
use std::time::Duration;

/// Idle time after which a bucket is erased
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What the actor should do when its alarm fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmOutcome {
    /// Idle for at least the threshold: erase everything
    Purge,
    /// Still active: fire again later
    Rearm {
        /// Epoch millis of the next firing
        at_millis: u64,
    },
}

/// Threshold and alarm arithmetic
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupPolicy {
    threshold_millis: u64,
}

impl CleanupPolicy {
    /// Purge buckets idle for at least `threshold`
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold_millis: threshold.as_millis() as u64,
        }
    }

    /// Idle threshold in milliseconds
    pub fn threshold_millis(&self) -> u64 {
        self.threshold_millis
    }

    /// Deadline to set after an admission at `now_millis`
    pub fn deadline_after(&self, now_millis: u64) -> u64 {
        now_millis.saturating_add(self.threshold_millis)
    }

    /// Decide the fate of a bucket whose alarm fired at `now_millis`.
    ///
    /// Derived only from the stored `last_refill_millis`, so early, late or
    /// repeated firings all converge on the same result.
    pub fn on_alarm(&self, state: &BucketState, now_millis: u64) -> AlarmOutcome {
        if state.idle_millis(now_millis) >= self.threshold_millis {
            AlarmOutcome::Purge
        } else {
            AlarmOutcome::Rearm {
                at_millis: self.deadline_after(state.last_refill_millis),
            }
        }
    }
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_INTERVAL)
    }
}

/// Sleep until `at_millis` as measured by `now_millis`, or forever when no
/// alarm is pending.
pub(crate) async fn sleep_until_alarm(at_millis: Option<u64>, now_millis: u64) {
    match at_millis {
        Some(at) => tokio::time::sleep(Duration::from_millis(at.saturating_sub(now_millis))).await,
        None => std::future::pending().await,
    }
}
