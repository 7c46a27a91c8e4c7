//! Turn persistence.
//!
//! The history store never owns turns durably; it appends through a
//! [`TurnStore`] and reloads the most recent ones on a cache miss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::types::{Turn, TurnRole};

/// Durable, append-only storage for conversation turns.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append one turn to a session.
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()>;

    /// The last `n` turns of a session, oldest first.
    async fn load_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<Turn>>;
}

pub type SharedTurnStore = Arc<dyn TurnStore>;

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local turn store.
#[derive(Debug, Default)]
pub struct InMemoryTurnStore {
    sessions: Mutex<HashMap<String, Vec<Turn>>>,
    fail_appends: AtomicBool,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail, for exercising persistence outages.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Every stored turn of a session, oldest first.
    pub fn turns(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SessionError::Persistence("turn store unavailable".to_string()));
        }
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn load_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<Turn>> {
        let sessions = self.sessions.lock();
        let turns = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = turns.len().saturating_sub(n);
        Ok(turns[skip..].to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// Turn store in a `conversations` table.
pub struct SqliteTurnStore {
    conn: Mutex<Connection>,
}

impl SqliteTurnStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SessionError::Persistence(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        info!(path = %path.display(), "Turn store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                is_dialect INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_session
                ON conversations(session_id, id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored turns for a session.
    pub fn count(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

#[derive(Debug)]
struct UnknownRole(String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (session_id, role, content, language, is_dialect, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                turn.role.as_str(),
                turn.text,
                turn.language,
                turn.is_dialect,
                turn.created_at.to_rfc3339()
            ],
        )?;
        debug!(session_id = %session_id, role = %turn.role, "Turn persisted");
        Ok(())
    }

    async fn load_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<Turn>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content, language, is_dialect, created_at FROM (
                 SELECT id, role, content, language, is_dialect, created_at
                 FROM conversations
                 WHERE session_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2
             ) ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id, n as i64], |row| {
            let role: String = row.get(0)?;
            let created_at: String = row.get(4)?;
            Ok(Turn {
                role: role
                    .parse::<TurnRole>()
                    .map_err(|_| conversion_error(0, UnknownRole(role.clone())))?,
                text: row.get(1)?,
                language: row.get(2)?,
                is_dialect: row.get(3)?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| conversion_error(4, e))?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
