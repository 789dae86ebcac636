//! Identity router
//!
//! Maps identity keys to their actors. The registry shard lock is held while
//! a missing or stopped actor is replaced, so a key never has two live
//! actors at once.

use crate::actor::{ActorEnv, BucketActor, Registry};
use crate::{
    ActorHandle, BucketStore, CleanupPolicy, Decision, IdentityKey, LimitRequest, LimiterConfig,
    LimiterObserver, LimiterStats, LimiterStatsSnapshot, RateLimit, RateLimitError, SharedClock,
    Subject, TokioClock, TracingObserver,
};
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Times a check is retried against a freshly resolved actor after the
/// previous one stopped underneath it
const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// Entry point for rate limit checks.
///
/// Cheap to clone; clones share the same actors, store and statistics.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    env: Arc<ActorEnv>,
    config: LimiterConfig,
    next_generation: AtomicU64,
}

/// Builder for [`RateLimiter`]
pub struct RateLimiterBuilder {
    store: Arc<dyn BucketStore>,
    config: LimiterConfig,
    clock: Option<SharedClock>,
    observer: Arc<dyn LimiterObserver>,
}

impl RateLimiterBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: LimiterConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the time source (defaults to [`TokioClock`])
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the observer (defaults to [`TracingObserver`])
    pub fn observer(mut self, observer: Arc<dyn LimiterObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the configuration and build the limiter.
    ///
    /// No actors are spawned until the first key is resolved.
    pub fn build(self) -> Result<RateLimiter, RateLimitError> {
        self.config.validate()?;

        let env = ActorEnv {
            store: self.store,
            clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock::new())),
            cleanup: CleanupPolicy::new(self.config.cleanup_duration()),
            persist_mode: self.config.persist_mode,
            mailbox_capacity: self.config.mailbox_capacity,
            observer: self.observer,
            stats: Arc::new(LimiterStats::new()),
        };

        Ok(RateLimiter {
            inner: Arc::new(Inner {
                registry: Arc::new(Registry::new()),
                env: Arc::new(env),
                config: self.config,
                next_generation: AtomicU64::new(1),
            }),
        })
    }
}

impl RateLimiter {
    /// Start building a limiter over `store`
    pub fn builder(store: Arc<dyn BucketStore>) -> RateLimiterBuilder {
        RateLimiterBuilder {
            store,
            config: LimiterConfig::default(),
            clock: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Limiter with default configuration over `store`
    pub fn new(store: Arc<dyn BucketStore>) -> Result<Self, RateLimitError> {
        Self::builder(store).build()
    }

    /// Actor for `key`, spawning one if none is running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn resolve(&self, key: &str) -> ActorHandle {
        let existing = self.inner.registry.get(key).map(|h| h.value().clone());
        if let Some(handle) = existing.filter(|h| !h.is_stopped()) {
            return handle;
        }

        match self.inner.registry.entry(Arc::from(key)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_stopped() {
                    let handle = self.spawn(entry.key().clone());
                    entry.insert(handle);
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn(entry.key().clone());
                entry.insert(handle).value().clone()
            }
        }
    }

    fn spawn(&self, key: Arc<str>) -> ActorHandle {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %key, generation, "Spawning bucket actor");
        BucketActor::spawn(
            key,
            generation,
            self.inner.env.clone(),
            Arc::downgrade(&self.inner.registry),
        )
    }

    /// Apply `limit` to the bucket for `key`
    pub async fn check_limit(&self, key: &str, limit: RateLimit) -> Result<Decision, RateLimitError> {
        limit.validate()?;

        let mut attempt = 1;
        loop {
            match self.resolve(key).check_limit(limit).await {
                Err(e) if e.is_actor_stopped() && attempt < MAX_RESOLVE_ATTEMPTS => attempt += 1,
                result => return result,
            }
        }
    }

    /// Like [`check_limit`](Self::check_limit) with a duration string interval
    pub async fn check(&self, key: &str, request: &LimitRequest) -> Result<Decision, RateLimitError> {
        let limit = request.to_limit()?;
        self.check_limit(key, limit).await
    }

    /// Check `subject` against the configured policy named `scope`
    pub async fn check_policy(
        &self,
        subject: &Subject,
        scope: &str,
    ) -> Result<Decision, RateLimitError> {
        let limit = self.inner.config.policy(scope)?.to_limit();
        let key = IdentityKey::new(subject, scope);
        self.check_limit(key.as_str(), limit).await
    }

    /// Spawn an actor for every key with a persisted alarm so idle cleanup
    /// resumes after a restart. Returns the recovered keys.
    pub fn recover(&self) -> Result<Vec<String>, RateLimitError> {
        let keys = self.inner.env.store.alarm_keys()?;
        for key in &keys {
            self.resolve(key);
        }
        tracing::info!(count = keys.len(), "Recovered cleanup alarms");
        Ok(keys)
    }

    /// Number of running actors
    pub fn active_actors(&self) -> usize {
        self.inner
            .registry
            .iter()
            .filter(|entry| !entry.value().is_stopped())
            .count()
    }

    /// Counters across every actor
    pub fn stats(&self) -> LimiterStatsSnapshot {
        self.inner.env.stats.snapshot()
    }

    /// Configuration the limiter was built with
    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }
}
