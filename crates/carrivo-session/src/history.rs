//! Keyed per-session history with LRU eviction and TTL.
//!
//! Each session gets its own `tokio::sync::Mutex<SessionHistory>`. A caller
//! that holds the guard for the whole turn serializes every mutation of that
//! session, including persistence, while other sessions proceed unhindered.
//! The outer map lock is only held for lookups and never across I/O.
//!
//! Eviction and expiry only drop the cache's reference. A handle that a turn
//! still holds or waits on stays reachable through a weak map, so the next
//! lookup for that session returns the same mutex instead of a fresh one.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use crate::config::HistoryConfig;
use crate::error::{Result, SessionError};
use crate::persistence::SharedTurnStore;
use crate::ttl::TtlTracker;
use crate::types::{SessionHistory, Turn};

/// Shared handle to one session's history.
pub type SharedHistory = Arc<Mutex<SessionHistory>>;

struct Inner {
    lru: LruCache<String, SharedHistory>,
    ttl: TtlTracker,
    /// Every handle handed out, including ones no longer cached.
    live: HashMap<String, Weak<Mutex<SessionHistory>>>,
}

/// Explicit keyed store of session histories.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Mutex<Inner>>,
    turns: SharedTurnStore,
    config: HistoryConfig,
}

/// Exclusive access to one session for the duration of a turn.
pub struct SessionGuard {
    history: OwnedMutexGuard<SessionHistory>,
    turns: SharedTurnStore,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig, turns: SharedTurnStore) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                lru: LruCache::new(cap),
                ttl: TtlTracker::new(config.ttl),
                live: HashMap::new(),
            })),
            turns,
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Handle for a session, created empty on first sight.
    async fn handle(&self, session_id: &str) -> SharedHistory {
        let mut inner = self.inner.lock().await;

        if inner.ttl.is_expired(session_id) && inner.lru.pop(session_id).is_some() {
            debug!(session_id = %session_id, "Session history expired");
        }
        inner.ttl.touch(session_id);

        if let Some(handle) = inner.lru.get(session_id) {
            trace!(session_id = %session_id, "Session history cached");
            return Arc::clone(handle);
        }

        // Evicted or expired while a turn still held it
        let in_use = inner.live.get(session_id).and_then(Weak::upgrade);
        let handle = match in_use {
            Some(handle) => {
                debug!(session_id = %session_id, "Session history still in use, re-cached");
                handle
            }
            None => {
                inner.live.retain(|_, weak| weak.strong_count() > 0);
                let handle = Arc::new(Mutex::new(SessionHistory::new(
                    session_id,
                    self.config.history_limit,
                )));
                inner
                    .live
                    .insert(session_id.to_string(), Arc::downgrade(&handle));
                handle
            }
        };

        if let Some((evicted, _)) = inner.lru.push(session_id.to_string(), Arc::clone(&handle)) {
            if evicted != session_id {
                inner.ttl.remove(&evicted);
                debug!(session_id = %evicted, "Evicted LRU session history");
            }
        }
        handle
    }

    /// Lock a session for one turn, loading its recent turns on a miss.
    pub async fn lock(&self, session_id: &str) -> Result<SessionGuard> {
        if session_id.trim().is_empty() {
            return Err(SessionError::InvalidSessionId(session_id.to_string()));
        }

        let mut history = self.handle(session_id).await.lock_owned().await;
        if !history.loaded {
            match self
                .turns
                .load_recent_turns(session_id, self.config.history_limit)
                .await
            {
                Ok(turns) => {
                    debug!(session_id = %session_id, turns = turns.len(), "Loaded session history");
                    for turn in turns {
                        history.push(turn);
                    }
                    history.loaded = true;
                }
                Err(e) => {
                    // Retry on the next turn; this one proceeds without history
                    warn!(session_id = %session_id, error = %e, "Failed to load session history");
                }
            }
        }

        Ok(SessionGuard {
            history,
            turns: Arc::clone(&self.turns),
        })
    }

    /// Drop expired in-memory histories. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let expired = inner.ttl.drain_expired();
        let mut removed = 0;
        for id in expired {
            if inner.lru.pop(&id).is_some() {
                removed += 1;
            }
        }
        inner.live.retain(|_, weak| weak.strong_count() > 0);
        if removed > 0 {
            debug!(count = removed, "Cleaned up expired session histories");
        }
        removed
    }

    /// Sessions currently held in memory.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.lru.contains(session_id) && !inner.ttl.is_expired(session_id)
    }
}

impl SessionGuard {
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut SessionHistory {
        &mut self.history
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        self.history.recent(n)
    }

    /// Persist a turn and add it to the in-memory window.
    ///
    /// The turn is kept in memory even when persistence fails; the error is
    /// returned so the caller can report it.
    pub async fn append(&mut self, turn: Turn) -> Result<()> {
        let session_id = self.history.session_id().to_string();
        let persisted = self.turns.append_turn(&session_id, &turn).await;
        self.history.push(turn);
        persisted
    }
}
