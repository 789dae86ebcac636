//! Limiter configuration

use crate::{Interval, RateLimit, RateLimitError, DEFAULT_CLEANUP_INTERVAL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default mailbox depth for each actor
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// When an admitted check's state is written relative to the reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Reply first, then write. A crash in between replays a slightly fuller
    /// bucket on recovery.
    #[default]
    AfterReply,
    /// Write, then reply
    BeforeReply,
}

/// A named limit, e.g. `comments:create`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum burst size
    pub capacity: u32,
    /// Time to refill from empty
    pub interval: Interval,
    /// Tokens per check; defaults to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl PolicyConfig {
    /// Policy with the default cost
    pub fn new(capacity: u32, interval: &str) -> Result<Self, RateLimitError> {
        Ok(Self {
            capacity,
            interval: Interval::parse(interval)?,
            cost: None,
        })
    }

    /// Limit parameters for a check under this policy
    pub fn to_limit(&self) -> RateLimit {
        let limit = RateLimit::new(self.capacity, self.interval.as_millis());
        match self.cost {
            Some(cost) => limit.with_cost(cost),
            None => limit,
        }
    }
}

/// Top-level limiter configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Idle time after which a bucket is erased
    pub cleanup_interval: Interval,
    /// Commands buffered per actor before callers wait
    pub mailbox_capacity: usize,
    /// When admissions are written relative to the reply
    pub persist_mode: PersistMode,
    /// Named policies keyed by scope
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        let policy = |capacity, interval| PolicyConfig {
            capacity,
            interval,
            cost: None,
        };
        let minute = Interval::known("1m", 60_000);
        let hour = Interval::known("1h", 3_600_000);
        let policies = BTreeMap::from([
            ("comments:create".to_string(), policy(10, minute.clone())),
            ("comments:delete".to_string(), policy(10, minute)),
            ("friend-links:submit".to_string(), policy(3, hour)),
        ]);

        Self {
            cleanup_interval: Interval::known("7d", DEFAULT_CLEANUP_INTERVAL.as_millis() as u64),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            persist_mode: PersistMode::default(),
            policies,
        }
    }
}

impl LimiterConfig {
    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RateLimitError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| RateLimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RateLimitError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RateLimitError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check every policy, the cleanup interval and the mailbox size
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.cleanup_interval.as_millis() == 0 {
            return Err(RateLimitError::Config("cleanup_interval must be positive".into()));
        }
        if self.mailbox_capacity == 0 {
            return Err(RateLimitError::Config("mailbox_capacity must be positive".into()));
        }
        for (scope, policy) in &self.policies {
            policy
                .to_limit()
                .validate()
                .map_err(|e| RateLimitError::Config(format!("policy {scope:?}: {e}")))?;
        }
        Ok(())
    }

    /// Look up a policy by scope name
    pub fn policy(&self, scope: &str) -> Result<&PolicyConfig, RateLimitError> {
        self.policies
            .get(scope)
            .ok_or_else(|| RateLimitError::UnknownPolicy(scope.to_owned()))
    }

    /// Idle threshold as a std duration
    pub fn cleanup_duration(&self) -> std::time::Duration {
        self.cleanup_interval.as_duration()
    }
}
