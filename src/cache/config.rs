//! Cache refresh policy.

use std::time::Duration;

/// When a served snapshot should also schedule a background refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Refresh once the snapshot is older than the TTL.
    Interval(Duration),
    /// Every read schedules a refresh after serving from cache.
    Always,
}

impl RefreshPolicy {
    pub fn is_stale(&self, age: time::Duration) -> bool {
        match self {
            RefreshPolicy::Always => true,
            RefreshPolicy::Interval(ttl) => {
                let ttl = time::Duration::try_from(*ttl).unwrap_or(time::Duration::MAX);
                age > ttl
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RefreshPolicy::Always => "always".to_string(),
            RefreshPolicy::Interval(ttl) => format!("interval({}s)", ttl.as_secs()),
        }
    }
}
