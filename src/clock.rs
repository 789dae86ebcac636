//! Wall-clock source shared by actors and their alarms

use std::sync::Arc;

/// Source of epoch milliseconds.
///
/// Alarms are slept on tokio's timer, so a clock that disagrees with tokio
/// time will fire alarms early or late. [`TokioClock`] keeps both in step.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds since UNIX epoch
    fn now_millis(&self) -> u64;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock anchored to tokio's monotonic timer.
///
/// Reads the system time once at construction and advances with
/// `tokio::time::Instant` afterwards, so a paused test runtime moves it with
/// `tokio::time::advance`.
pub struct TokioClock {
    anchor_millis: u64,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor at the current system time
    pub fn new() -> Self {
        Self::anchored_at(system_now_millis())
    }

    /// Anchor at a fixed epoch time
    pub fn anchored_at(anchor_millis: u64) -> Self {
        Self {
            anchor_millis,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.origin);
        self.anchor_millis + elapsed.as_millis() as u64
    }
}

/// Current system time in milliseconds since UNIX epoch
pub fn system_now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
