//! Token bucket actor
//!
//! One tokio task per identity key. The task owns the key's [`BucketState`]
//! and its cleanup alarm, takes commands from a bounded mailbox one at a time
//! and is the only writer of the key's rows in the [`BucketStore`].
//!
//! ```text
//! UNINITIALIZED --check_limit--> ACTIVE --alarm, idle >= threshold--> UNINITIALIZED
//!                                  ^  |
//!                                  +--+ check_limit, or alarm with recent activity
//! ```

use crate::bucket::{self, Evaluation};
use crate::cleanup::{sleep_until_alarm, AlarmOutcome, CleanupPolicy};
use crate::{
    BucketState, BucketStore, Decision, LimiterObserver, LimiterStats, PersistMode, RateLimit,
    RateLimitError, SharedClock, StoreError,
};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

pub(crate) type Registry = dashmap::DashMap<Arc<str>, ActorHandle>;

/// Everything an actor shares with its router
pub(crate) struct ActorEnv {
    pub store: Arc<dyn BucketStore>,
    pub clock: SharedClock,
    pub cleanup: CleanupPolicy,
    pub persist_mode: PersistMode,
    pub mailbox_capacity: usize,
    pub observer: Arc<dyn LimiterObserver>,
    pub stats: Arc<LimiterStats>,
}

type Reply<T> = oneshot::Sender<Result<T, RateLimitError>>;

/// Commands accepted by a bucket actor
#[derive(Debug)]
pub(crate) enum BucketCommand {
    CheckLimit {
        limit: RateLimit,
        reply_to: Reply<Decision>,
    },
    /// Fire the pending alarm now, replying whether one was pending
    RunAlarm { reply_to: Reply<bool> },
    Snapshot { reply_to: Reply<BucketSnapshot> },
}

impl BucketCommand {
    fn fail(self, error: RateLimitError) {
        match self {
            Self::CheckLimit { reply_to, .. } => {
                let _ = reply_to.send(Err(error));
            }
            Self::RunAlarm { reply_to } => {
                let _ = reply_to.send(Err(error));
            }
            Self::Snapshot { reply_to } => {
                let _ = reply_to.send(Err(error));
            }
        }
    }
}

/// Point-in-time copy of an actor's state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketSnapshot {
    /// Bucket as the actor holds it
    pub state: BucketState,
    /// Pending cleanup deadline (epoch millis)
    pub alarm_at_millis: Option<u64>,
}

/// Address of one key's actor.
///
/// Cheap to clone. A handle goes stale once its actor purges an idle bucket
/// and stops; calls then fail with [`RateLimitError::ActorStopped`] and the
/// caller should resolve the key again.
#[derive(Clone)]
pub struct ActorHandle {
    key: Arc<str>,
    generation: u64,
    tx: mpsc::Sender<BucketCommand>,
}

impl ActorHandle {
    /// Identity key this actor serves
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Check if the actor has stopped accepting commands
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Apply the token bucket for this key
    pub async fn check_limit(&self, limit: RateLimit) -> Result<Decision, RateLimitError> {
        limit.validate()?;
        self.ask(|reply_to| BucketCommand::CheckLimit { limit, reply_to })
            .await
    }

    /// Fire the pending cleanup alarm immediately.
    ///
    /// Returns `false` when no alarm was pending.
    pub async fn run_alarm(&self) -> Result<bool, RateLimitError> {
        self.ask(|reply_to| BucketCommand::RunAlarm { reply_to }).await
    }

    /// Copy of the actor's current state
    pub async fn snapshot(&self) -> Result<BucketSnapshot, RateLimitError> {
        self.ask(|reply_to| BucketCommand::Snapshot { reply_to }).await
    }

    async fn ask<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> BucketCommand,
    ) -> Result<T, RateLimitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RateLimitError::ActorStopped(self.key.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RateLimitError::ActorStopped(self.key.to_string()))?
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Whether the actor keeps running after a command or alarm
#[derive(Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct BucketActor {
    key: Arc<str>,
    generation: u64,
    state: BucketState,
    alarm_at: Option<u64>,
    env: Arc<ActorEnv>,
    registry: Weak<Registry>,
}

impl BucketActor {
    /// Spawn the actor task and return its handle
    pub(crate) fn spawn(
        key: Arc<str>,
        generation: u64,
        env: Arc<ActorEnv>,
        registry: Weak<Registry>,
    ) -> ActorHandle {
        let (tx, rx) = mpsc::channel(env.mailbox_capacity);
        LimiterStats::bump(&env.stats.actors_spawned);

        let actor = Self {
            key: key.clone(),
            generation,
            state: BucketState::EMPTY,
            alarm_at: None,
            env,
            registry,
        };
        tokio::spawn(actor.run(rx));

        ActorHandle { key, generation, tx }
    }

    fn now_millis(&self) -> u64 {
        self.env.clock.now_millis()
    }

    async fn run(mut self, mut rx: mpsc::Receiver<BucketCommand>) {
        if let Err(error) = self.load() {
            LimiterStats::bump(&self.env.stats.load_failures);
            self.env.observer.on_load_failed(&self.key, &error);
            rx.close();
            while let Some(command) = rx.recv().await {
                command.fail(RateLimitError::Storage(error.clone()));
            }
            return;
        }

        loop {
            let alarm_at = self.alarm_at;
            let now = self.now_millis();

            let flow = tokio::select! {
                biased;
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => Flow::Stop,
                },
                _ = sleep_until_alarm(alarm_at, now) => self.fire_alarm(),
            };

            if flow == Flow::Stop {
                break;
            }
        }

        self.evict(&mut rx).await;
    }

    /// Read persisted rows before serving any command
    fn load(&mut self) -> Result<(), StoreError> {
        let store = &self.env.store;
        if let Some(state) = store.load(&self.key)? {
            self.state = state;
        }
        self.alarm_at = store.load_alarm(&self.key)?;

        // A bucket written without its alarm row still needs cleaning up.
        if self.alarm_at.is_none() && !self.state.is_uninitialized() {
            self.alarm_at = Some(self.env.cleanup.deadline_after(self.state.last_refill_millis));
        }

        tracing::trace!(key = %self.key, alarm_at = ?self.alarm_at, "Bucket loaded");
        Ok(())
    }

    fn handle(&mut self, command: BucketCommand) -> Flow {
        match command {
            BucketCommand::CheckLimit { limit, reply_to } => {
                self.check_limit(limit, reply_to);
                Flow::Continue
            }
            BucketCommand::RunAlarm { reply_to } => {
                if self.alarm_at.is_none() {
                    let _ = reply_to.send(Ok(false));
                    return Flow::Continue;
                }
                let flow = self.fire_alarm();
                let _ = reply_to.send(Ok(true));
                flow
            }
            BucketCommand::Snapshot { reply_to } => {
                let _ = reply_to.send(Ok(BucketSnapshot {
                    state: self.state,
                    alarm_at_millis: self.alarm_at,
                }));
                Flow::Continue
            }
        }
    }

    fn check_limit(&mut self, limit: RateLimit, reply_to: Reply<Decision>) {
        let now = self.now_millis();
        let stats = &self.env.stats;

        match bucket::evaluate(&self.state, &limit, now) {
            Evaluation::Impossible => {
                LimiterStats::bump(&stats.impossible);
                self.env.observer.on_impossible(&self.key, limit.cost, limit.capacity);
                let _ = reply_to.send(Ok(Decision::IMPOSSIBLE));
            }
            Evaluation::Rejected(decision) => {
                LimiterStats::bump(&stats.rejected);
                self.env.observer.on_rejected(&self.key, &decision);
                let _ = reply_to.send(Ok(decision));
            }
            Evaluation::Admitted { decision, state } => {
                LimiterStats::bump(&stats.admitted);
                self.state = state;
                self.alarm_at = Some(self.env.cleanup.deadline_after(now));
                self.env.observer.on_admitted(&self.key, &decision);

                match self.env.persist_mode {
                    PersistMode::AfterReply => {
                        let _ = reply_to.send(Ok(decision));
                        self.persist();
                    }
                    PersistMode::BeforeReply => {
                        self.persist();
                        let _ = reply_to.send(Ok(decision));
                    }
                }
            }
        }
    }

    /// Write the bucket and its alarm. Failures never revoke an admission.
    fn persist(&self) {
        let store = &self.env.store;
        let result = store.save(&self.key, &self.state).and_then(|()| match self.alarm_at {
            Some(at_millis) => store.save_alarm(&self.key, at_millis),
            None => Ok(()),
        });

        if let Err(error) = result {
            LimiterStats::bump(&self.env.stats.persist_failures);
            self.env.observer.on_persist_failed(&self.key, &error);
        }
    }

    fn fire_alarm(&mut self) -> Flow {
        let now = self.now_millis();

        match self.env.cleanup.on_alarm(&self.state, now) {
            AlarmOutcome::Purge => {
                let idle_millis = self.state.idle_millis(now);
                self.state = BucketState::EMPTY;
                self.alarm_at = None;

                if let Err(error) = self.env.store.delete_all(&self.key) {
                    LimiterStats::bump(&self.env.stats.persist_failures);
                    self.env.observer.on_persist_failed(&self.key, &error);
                }
                LimiterStats::bump(&self.env.stats.buckets_purged);
                self.env.observer.on_purged(&self.key, idle_millis);
                Flow::Stop
            }
            AlarmOutcome::Rearm { at_millis } => {
                self.alarm_at = Some(at_millis);
                if let Err(error) = self.env.store.save_alarm(&self.key, at_millis) {
                    LimiterStats::bump(&self.env.stats.persist_failures);
                    self.env.observer.on_persist_failed(&self.key, &error);
                }
                LimiterStats::bump(&self.env.stats.alarms_rearmed);
                self.env.observer.on_alarm_rearmed(&self.key, at_millis);
                Flow::Continue
            }
        }
    }

    /// Leave the registry and refuse anything still queued.
    ///
    /// Only removes the registry entry if it still points at this actor, so a
    /// successor spawned for the same key is left alone.
    async fn evict(&self, rx: &mut mpsc::Receiver<BucketCommand>) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry
                .remove_if(&self.key, |_, handle| handle.generation == self.generation)
                .is_some();
            if removed {
                LimiterStats::bump(&self.env.stats.actors_evicted);
            }
        }

        rx.close();
        while let Some(command) = rx.recv().await {
            command.fail(RateLimitError::ActorStopped(self.key.to_string()));
        }
        tracing::trace!(key = %self.key, generation = self.generation, "Bucket actor stopped");
    }
}
