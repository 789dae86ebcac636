//! Persisted bucket state

use serde::{Deserialize, Serialize};

/// Token count and refill baseline for one identity.
///
/// `last_refill_millis == 0` marks a bucket that has never admitted a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    /// Available tokens as of `last_refill_millis`
    pub tokens: f64,
    /// Epoch millis of the last admission or initialization
    #[serde(rename = "lastRefill")]
    pub last_refill_millis: u64,
}

impl BucketState {
    /// Uninitialized sentinel
    pub const EMPTY: Self = Self {
        tokens: 0.0,
        last_refill_millis: 0,
    };

    /// A full bucket whose baseline is `now_millis`
    pub fn full(capacity: u32, now_millis: u64) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill_millis: now_millis,
        }
    }

    /// Check if the bucket has never been initialized
    pub fn is_uninitialized(&self) -> bool {
        self.last_refill_millis == 0
    }

    /// Millis since the last admission, saturating at zero
    pub fn idle_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.last_refill_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_uninitialized() {
        assert!(BucketState::default().is_uninitialized());
        assert_eq!(BucketState::default(), BucketState::EMPTY);
        assert!(!BucketState::full(5, 1_000).is_uninitialized());
    }

    #[test]
    fn test_serialized_field_names() {
        let yaml = serde_yaml::to_string(&BucketState::full(3, 42)).unwrap();
        assert!(yaml.contains("tokens: 3"));
        assert!(yaml.contains("lastRefill: 42"));
    }
}
