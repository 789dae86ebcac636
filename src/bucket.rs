//! Token bucket algorithm
//!
//! Pure functions over [`BucketState`]. The actor owns the state and decides
//! when to persist; nothing here touches storage or clocks.

use crate::{parse_duration, BucketState, RateLimitError};
use serde::{Deserialize, Serialize};

/// Sentinel `retry_after_ms` for a cost that can never be satisfied
pub const RETRY_NEVER: i64 = -1;

/// Limit parameters for a single check
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum burst size
    pub capacity: u32,
    /// Time to refill from empty to full (milliseconds)
    pub interval_millis: u64,
    /// Tokens consumed by this check
    pub cost: f64,
}

impl RateLimit {
    /// Limit with the default cost of one token
    pub fn new(capacity: u32, interval_millis: u64) -> Self {
        Self {
            capacity,
            interval_millis,
            cost: 1.0,
        }
    }

    /// Override the cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Reject parameters the algorithm cannot work with
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.capacity == 0 {
            return Err(RateLimitError::InvalidLimit("capacity must be positive"));
        }
        if self.interval_millis == 0 {
            return Err(RateLimitError::InvalidLimit("interval must be positive"));
        }
        if !self.cost.is_finite() || self.cost <= 0.0 {
            return Err(RateLimitError::InvalidLimit("cost must be a positive number"));
        }
        Ok(())
    }

    /// Refill rate in tokens per millisecond
    pub fn rate_per_millis(&self) -> f64 {
        self.capacity as f64 / self.interval_millis as f64
    }

    fn is_impossible(&self) -> bool {
        self.cost > self.capacity as f64
    }
}

/// Check options as callers write them, with a duration string interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitRequest {
    /// Maximum burst size
    pub capacity: u32,
    /// e.g. `"1m"`, `"7d"`
    pub interval: String,
    /// Tokens per check; defaults to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl LimitRequest {
    /// Request with the default cost
    pub fn new(capacity: u32, interval: impl Into<String>) -> Self {
        Self {
            capacity,
            interval: interval.into(),
            cost: None,
        }
    }

    /// Override the cost
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Parse the interval and validate the resulting limit
    pub fn to_limit(&self) -> Result<RateLimit, RateLimitError> {
        let limit = RateLimit::new(self.capacity, parse_duration(&self.interval)?)
            .with_cost(self.cost.unwrap_or(1.0));
        limit.validate()?;
        Ok(limit)
    }
}

/// Outcome of a rate limit check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Whole tokens left after this check
    pub remaining: u64,
    /// 0 when admitted, the wait in millis when rejected, -1 when impossible
    pub retry_after_ms: i64,
}

impl Decision {
    /// Rejection for a cost larger than the bucket
    pub const IMPOSSIBLE: Self = Self {
        allowed: false,
        remaining: 0,
        retry_after_ms: RETRY_NEVER,
    };

    /// Check if retrying can never succeed under this limit
    pub fn is_impossible(&self) -> bool {
        self.retry_after_ms == RETRY_NEVER
    }

    /// Suggested wait before retrying, if any
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        u64::try_from(self.retry_after_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(std::time::Duration::from_millis)
    }
}

/// Result of evaluating a check against a bucket
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Evaluation {
    /// Cost exceeds capacity; state untouched
    Impossible,
    /// Not enough tokens; state untouched
    Rejected(Decision),
    /// Admitted; `state` must replace the stored bucket
    Admitted {
        /// Decision returned to the caller
        decision: Decision,
        /// New bucket state with `last_refill_millis` at now (never 0)
        state: BucketState,
    },
}

impl Evaluation {
    /// Caller-facing decision
    pub fn decision(&self) -> Decision {
        match self {
            Self::Impossible => Decision::IMPOSSIBLE,
            Self::Rejected(decision) => *decision,
            Self::Admitted { decision, .. } => *decision,
        }
    }
}

/// Tokens available at `now_millis` without committing the refill.
///
/// An uninitialized bucket counts as full.
pub fn available_tokens(state: &BucketState, limit: &RateLimit, now_millis: u64) -> f64 {
    let capacity = limit.capacity as f64;
    if state.is_uninitialized() {
        return capacity;
    }
    let elapsed = state.idle_millis(now_millis) as f64;
    (state.tokens + elapsed * limit.rate_per_millis()).min(capacity)
}

/// Apply the token bucket to `state` at `now_millis`.
///
/// Rejections never advance `last_refill_millis`, so repeated rejections keep
/// measuring elapsed time from the last admission.
pub fn evaluate(state: &BucketState, limit: &RateLimit, now_millis: u64) -> Evaluation {
    if limit.is_impossible() {
        return Evaluation::Impossible;
    }

    let available = available_tokens(state, limit, now_millis);

    if available < limit.cost {
        let retry_after = ((limit.cost - available) / limit.rate_per_millis()).ceil();
        return Evaluation::Rejected(Decision {
            allowed: false,
            remaining: available.floor() as u64,
            retry_after_ms: retry_after as i64,
        });
    }

    let tokens = available - limit.cost;
    Evaluation::Admitted {
        decision: Decision {
            allowed: true,
            remaining: tokens.floor() as u64,
            retry_after_ms: 0,
        },
        // 0 is the uninitialized marker
        state: BucketState {
            tokens,
            last_refill_millis: now_millis.max(1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: u64 = 60_000;
    const T0: u64 = 1_700_000_000_000;

    fn drain(limit: &RateLimit, mut state: BucketState, times: usize, now: u64) -> BucketState {
        for _ in 0..times {
            match evaluate(&state, limit, now) {
                Evaluation::Admitted { state: next, .. } => state = next,
                other => panic!("expected admit, got {other:?}"),
            }
        }
        state
    }

    #[test]
    fn test_fresh_bucket_admits_with_remaining() {
        let limit = RateLimit::new(5, MINUTE);
        let eval = evaluate(&BucketState::EMPTY, &limit, T0);
        assert_eq!(
            eval.decision(),
            Decision { allowed: true, remaining: 4, retry_after_ms: 0 }
        );
        match eval {
            Evaluation::Admitted { state, .. } => {
                assert_eq!(state.tokens, 4.0);
                assert_eq!(state.last_refill_millis, T0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_custom_cost() {
        let limit = RateLimit::new(5, MINUTE).with_cost(2.0);
        let decision = evaluate(&BucketState::EMPTY, &limit, T0).decision();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3);
    }

    #[test]
    fn test_impossible_cost_ignores_state() {
        let limit = RateLimit::new(5, MINUTE).with_cost(6.0);
        assert_eq!(evaluate(&BucketState::EMPTY, &limit, T0), Evaluation::Impossible);
        assert_eq!(
            evaluate(&BucketState::full(5, T0), &limit, T0).decision(),
            Decision::IMPOSSIBLE
        );
        assert!(Decision::IMPOSSIBLE.is_impossible());
        assert_eq!(Decision::IMPOSSIBLE.retry_after(), None);
    }

    #[test]
    fn test_exhaustion_and_retry_after() {
        let limit = RateLimit::new(5, MINUTE);
        let state = drain(&limit, BucketState::EMPTY, 5, T0);

        match evaluate(&state, &limit, T0) {
            Evaluation::Rejected(decision) => {
                assert_eq!(decision.remaining, 0);
                assert_eq!(decision.retry_after_ms, 12_000);
                assert_eq!(decision.retry_after(), Some(std::time::Duration::from_secs(12)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_refill_timing() {
        let limit = RateLimit::new(5, MINUTE);
        let state = drain(&limit, BucketState::EMPTY, 5, T0);

        let early = evaluate(&state, &limit, T0 + 11_900).decision();
        assert!(!early.allowed);
        assert!((100..=101).contains(&early.retry_after_ms));

        let later = evaluate(&state, &limit, T0 + 12_100).decision();
        assert!(later.allowed);
        assert_eq!(later.remaining, 0);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let limit = RateLimit::new(5, MINUTE);
        let state = drain(&limit, BucketState::EMPTY, 2, T0);
        let available = available_tokens(&state, &limit, T0 + 365 * 24 * 60 * MINUTE);
        assert_eq!(available, 5.0);

        match evaluate(&state, &limit, T0 + 10 * MINUTE) {
            Evaluation::Admitted { state, decision } => {
                assert_eq!(state.tokens, 4.0);
                assert_eq!(decision.remaining, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fractional_tokens_are_kept() {
        let limit = RateLimit::new(5, MINUTE).with_cost(0.5);
        let state = drain(&limit, BucketState::EMPTY, 3, T0);
        assert_eq!(state.tokens, 3.5);
        assert_eq!(evaluate(&state, &limit, T0).decision().remaining, 3);
    }

    #[test]
    fn test_clock_going_backwards_does_not_refill() {
        let limit = RateLimit::new(5, MINUTE);
        let state = drain(&limit, BucketState::EMPTY, 5, T0);
        assert!(!evaluate(&state, &limit, T0 - 60_000).decision().allowed);
    }

    #[test]
    fn test_admission_at_epoch_zero_stays_initialized() {
        let limit = RateLimit::new(5, MINUTE);
        let state = drain(&limit, BucketState::EMPTY, 5, 0);
        assert!(!state.is_uninitialized());
        assert!(!evaluate(&state, &limit, 0).decision().allowed);
    }

    #[test]
    fn test_limit_request() {
        let limit = LimitRequest::new(5, "1m").to_limit().unwrap();
        assert_eq!(limit, RateLimit::new(5, MINUTE));
        assert_eq!(
            LimitRequest::new(5, "1m").with_cost(2.0).to_limit().unwrap().cost,
            2.0
        );
        assert!(matches!(
            LimitRequest::new(5, "1 minute").to_limit(),
            Err(RateLimitError::InvalidDurationFormat(_))
        ));
        assert!(matches!(
            LimitRequest::new(5, "0s").to_limit(),
            Err(RateLimitError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(RateLimit::new(5, MINUTE).validate().is_ok());
        assert!(RateLimit::new(0, MINUTE).validate().is_err());
        assert!(RateLimit::new(5, 0).validate().is_err());
        assert!(RateLimit::new(5, MINUTE).with_cost(0.0).validate().is_err());
        assert!(RateLimit::new(5, MINUTE).with_cost(f64::NAN).validate().is_err());
    }
}
