//! Per-session conversation history for Carrivo.
//!
//! This crate provides:
//! - [`HistoryStore`]: an explicit keyed store (session id to history) with
//!   LRU eviction and TTL, handing out one lock per session
//! - [`TurnStore`]: the append-only persistence seam, with in-memory and
//!   SQLite implementations
//!
//! # Example
//!
//! ```rust,ignore
//! use carrivo_session::{HistoryConfig, HistoryStore, InMemoryTurnStore, Turn};
//!
//! let history = HistoryStore::new(HistoryConfig::default(), Arc::new(InMemoryTurnStore::new()));
//! let mut session = history.lock("session-1").await?;
//! let recent = session.recent(2);
//! session.append(Turn::user("ازاي ابدأ في البرمجة؟", "ar_EG")).await?;
//! ```

mod config;
mod error;
mod history;
mod persistence;
mod ttl;
mod types;

pub use config::{DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_SESSIONS, HistoryConfig};
pub use error::{Result, SessionError};
pub use history::{HistoryStore, SessionGuard, SharedHistory};
pub use persistence::{InMemoryTurnStore, SharedTurnStore, SqliteTurnStore, TurnStore};
pub use ttl::TtlTracker;
pub use types::{SessionHistory, Turn, TurnRole};
