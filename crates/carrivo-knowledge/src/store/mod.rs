//! Knowledge store implementation using SQLite.
//!
//! Provides persistent storage for roadmaps and FAQ entries using rusqlite,
//! with sqlite-vec tables for server-side similarity search. The store
//! implements both [`VectorIndex`](crate::index::VectorIndex) and
//! [`KnowledgeSource`](crate::index::KnowledgeSource), so a single file can
//! back the whole cascade when no remote index is configured.

mod item_ops;
mod roadmap_ops;
mod vector_ops;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::{KnowledgeError, Result};

pub use vector_ops::{BackfillReport, ReindexReport};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Store
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge store backed by SQLite.
///
/// Uses WAL mode for concurrent readers. All access goes through one
/// connection behind a mutex; callers never hold it across an await.
pub struct KnowledgeStore {
    pub(crate) conn: Mutex<Connection>,
    /// Configured embedding dimension.
    pub(crate) dims: usize,
    /// Set when stored vectors were built for a different dimension.
    pub(crate) vectors_stale: Mutex<Option<usize>>,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("dims", &self.dims)
            .field("vectors_stale", &*self.vectors_stale.lock())
            .finish_non_exhaustive()
    }
}

impl KnowledgeStore {
    /// Open or create a store at the given path for `dims`-wide embeddings.
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    KnowledgeError::InvalidData(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        crate::vector::init_vector_extension();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self::from_connection(conn, dims)?;
        info!(path = %path.display(), dims, "Knowledge store opened");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        crate::vector::init_vector_extension();
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, dims)
    }

    fn from_connection(conn: Connection, dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(KnowledgeError::InvalidData(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let store = Self {
            conn: Mutex::new(conn),
            dims,
            vectors_stale: Mutex::new(None),
        };
        store.initialize()?;
        store.init_vectors()?;
        Ok(store)
    }

    /// Configured embedding dimension.
    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// Initialize the database with schema and pragmas.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        // In-memory databases report "memory" and ignore WAL
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::create_schema(&conn)
    }

    /// Create the database schema.
    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        conn.execute_batch(
            r#"
            -- Curated learning paths
            CREATE TABLE IF NOT EXISTS roadmaps (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                slug TEXT NOT NULL UNIQUE,
                is_published INTEGER NOT NULL DEFAULT 1,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_roadmaps_category
                ON roadmaps(category);

            -- Bilingual question/answer entries
            CREATE TABLE IF NOT EXISTS faq (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                question_ar TEXT NOT NULL,
                answer_ar TEXT NOT NULL,
                question_ar_eg TEXT,
                answer_ar_eg TEXT,
                question_en TEXT NOT NULL,
                answer_en TEXT NOT NULL,
                category TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            -- Schema metadata
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let store = KnowledgeStore::open_in_memory(4).unwrap();
        assert_eq!(store.dimensions(), 4);
        assert!(!store.vectors_stale());
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert!(KnowledgeStore::open_in_memory(0).is_err());
    }

    #[test]
    fn test_open_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kb.db");

        let store = KnowledgeStore::open(&path, 4).unwrap();
        drop(store);

        assert!(path.exists());
        // Reopening with the same dims is clean
        let store = KnowledgeStore::open(&path, 4).unwrap();
        assert!(!store.vectors_stale());
    }
}
