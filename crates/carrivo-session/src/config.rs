//! Configuration for the history store.

use std::time::Duration;

/// Default maximum number of sessions kept in memory.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default number of turns kept per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 8;

/// Configuration for [`HistoryStore`](crate::HistoryStore).
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Sessions kept in memory before LRU eviction.
    pub max_sessions: usize,

    /// Idle time after which a session's in-memory history is dropped.
    /// Persisted turns are reloaded on the next message.
    pub ttl: Option<Duration>,

    /// Most recent turns held per session (and loaded on a miss).
    pub history_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            ttl: Some(Duration::from_secs(3600)),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
