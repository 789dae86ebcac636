//! Limiter observer trait

use crate::{Decision, StoreError};

/// Observer trait for external observability
pub trait LimiterObserver: Send + Sync + 'static {
    /// A check was admitted
    fn on_admitted(&self, key: &str, decision: &Decision);
    /// A check was rejected for lack of tokens
    fn on_rejected(&self, key: &str, decision: &Decision);
    /// A check asked for more than the bucket holds
    fn on_impossible(&self, key: &str, cost: f64, capacity: u32);
    /// A write or delete failed; the decision stands
    fn on_persist_failed(&self, key: &str, error: &StoreError);
    /// Cold-start read failed; the actor stops
    fn on_load_failed(&self, key: &str, error: &StoreError);
    /// Cleanup alarm found recent activity
    fn on_alarm_rearmed(&self, key: &str, at_millis: u64);
    /// Idle bucket erased
    fn on_purged(&self, key: &str, idle_millis: u64);
}

/// No-op observer
pub struct NoOpObserver;

impl LimiterObserver for NoOpObserver {
    fn on_admitted(&self, _key: &str, _decision: &Decision) {}
    fn on_rejected(&self, _key: &str, _decision: &Decision) {}
    fn on_impossible(&self, _key: &str, _cost: f64, _capacity: u32) {}
    fn on_persist_failed(&self, _key: &str, _error: &StoreError) {}
    fn on_load_failed(&self, _key: &str, _error: &StoreError) {}
    fn on_alarm_rearmed(&self, _key: &str, _at_millis: u64) {}
    fn on_purged(&self, _key: &str, _idle_millis: u64) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl LimiterObserver for TracingObserver {
    fn on_admitted(&self, key: &str, decision: &Decision) {
        tracing::trace!(key = %key, remaining = decision.remaining, "Request admitted");
    }

    fn on_rejected(&self, key: &str, decision: &Decision) {
        tracing::debug!(
            key = %key,
            remaining = decision.remaining,
            retry_after_ms = decision.retry_after_ms,
            "Request rate limited"
        );
    }

    fn on_impossible(&self, key: &str, cost: f64, capacity: u32) {
        tracing::warn!(key = %key, cost, capacity, "Cost exceeds bucket capacity");
    }

    fn on_persist_failed(&self, key: &str, error: &StoreError) {
        tracing::warn!(key = %key, error = %error, "Failed to persist bucket state");
    }

    fn on_load_failed(&self, key: &str, error: &StoreError) {
        tracing::error!(key = %key, error = %error, "Failed to load bucket state");
    }

    fn on_alarm_rearmed(&self, key: &str, at_millis: u64) {
        tracing::trace!(key = %key, at_millis, "Cleanup alarm rearmed");
    }

    fn on_purged(&self, key: &str, idle_millis: u64) {
        tracing::debug!(key = %key, idle_ms = idle_millis, "Idle bucket purged");
    }
}
