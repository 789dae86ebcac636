//! Durable per-identity token bucket rate limiting
//!
//! Every identity key (`"<subject>:<scope>"`) gets its own tokio actor that
//! owns the key's bucket and is the only writer of its persisted state.
//! Checks for one key are serialized through the actor's mailbox; checks for
//! different keys run in parallel. Idle buckets are purged by a persisted
//! cleanup alarm.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Pick a store
//! let store = Arc::new(InMemoryStore::new());
//!
//! // 2. Build the limiter (default policies, 7 day cleanup)
//! let limiter = RateLimiter::new(store)?;
//! limiter.recover()?;
//!
//! // 3. Check a request
//! let subject = Subject::resolve(Some("203.0.113.9"), None);
//! let decision = limiter.check_policy(&subject, "comments:create").await?;
//! if !decision.allowed {
//!     // retry after decision.retry_after_ms
//! }
//! ```

#![warn(missing_docs)]

// === Core Types ===
mod bucket;
mod clock;
mod duration;
mod errors;
mod identity;
mod state;

// === Actors ===
mod actor;
mod cleanup;
mod router;

// === Storage ===
#[cfg(feature = "lmdb")]
mod heed_store;
mod store;

// === Configuration ===
mod config;

// === Observability ===
mod observer;
mod stats;

// === Integrations ===
#[cfg(feature = "http")]
pub mod http;

#[cfg(any(test, feature = "test-harness"))]
pub mod testing;

// === Re-exports ===

// Types
pub use bucket::{available_tokens, evaluate, Decision, Evaluation, LimitRequest, RateLimit, RETRY_NEVER};
pub use clock::{system_now_millis, Clock, SharedClock, TokioClock};
pub use duration::{parse_duration, Interval};
pub use identity::{IdentityKey, Subject, DEFAULT_SCOPE, UNKNOWN_SUBJECT};
pub use state::BucketState;

// Errors
pub use errors::{RateLimitError, StoreError};

// Actors
pub use actor::{ActorHandle, BucketSnapshot};
pub use cleanup::{AlarmOutcome, CleanupPolicy, DEFAULT_CLEANUP_INTERVAL};
pub use router::{RateLimiter, RateLimiterBuilder};

// Storage
#[cfg(feature = "lmdb")]
pub use heed_store::HeedStore;
pub use store::{BucketStore, InMemoryStore};

// Configuration
pub use config::{LimiterConfig, PersistMode, PolicyConfig, DEFAULT_MAILBOX_CAPACITY};

// Observability
pub use observer::{LimiterObserver, NoOpObserver, TracingObserver};
pub use stats::{LimiterStats, LimiterStatsSnapshot};
