//! Error types for rate limit checks and bucket storage

/// Error surfaced to callers of the limiter
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Interval string is not `{number}{s|m|h|d}`
    #[error("Invalid duration format: {0:?}")]
    InvalidDurationFormat(String),
    /// Capacity, interval or cost outside their allowed range
    #[error("Invalid limit: {0}")]
    InvalidLimit(&'static str),
    /// Bucket state could not be read on cold start
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    /// The key's actor has stopped and no longer accepts commands
    #[error("Actor stopped: {0}")]
    ActorStopped(String),
    /// No policy is configured under this scope name
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),
    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl RateLimitError {
    /// Check if the error came from a stopped actor (safe to re-resolve)
    pub fn is_actor_stopped(&self) -> bool {
        matches!(self, Self::ActorStopped(_))
    }

    /// Check if the error came from the storage backend
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Error from a [`BucketStore`](crate::BucketStore) backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend I/O or transaction failure
    #[error("Backend error: {0}")]
    Backend(Box<str>),
    /// Stored row could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(Box<str>),
}

#[cfg(feature = "lmdb")]
impl From<heed::Error> for StoreError {
    fn from(err: heed::Error) -> Self {
        match err {
            heed::Error::Encoding(e) | heed::Error::Decoding(e) => Self::Codec(e.to_string().into()),
            other => Self::Backend(other.to_string().into()),
        }
    }
}
