//! Collaborator traits for the retrieval cascade.
//!
//! The cascade never talks to a database directly. It consumes a
//! [`VectorIndex`] for server-side similarity search and a
//! [`KnowledgeSource`] for raw item fetches. Both the embedded SQLite store
//! and the PostgREST client implement both traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{KnowledgeError, Result};
use crate::types::{Collection, ItemId, KnowledgeRecord, VectorMatch};

/// Similarity search over one collection's stored embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return at most `match_count` items with similarity strictly above
    /// `threshold`, ranked by descending similarity.
    async fn vector_search(
        &self,
        collection: Collection,
        query: &[f32],
        match_count: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Raw read access to knowledge items.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Active items of `collection` in creation order, at most `limit`.
    async fn fetch_active_items(
        &self,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>>;

    /// Resolve ids to records. Unknown ids are skipped; order is not
    /// guaranteed.
    async fn get_items(&self, collection: Collection, ids: &[ItemId])
    -> Result<Vec<KnowledgeRecord>>;
}

pub type SharedVectorIndex = Arc<dyn VectorIndex>;
pub type SharedKnowledgeSource = Arc<dyn KnowledgeSource>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

/// How a [`MockIndex`] answers.
#[derive(Debug, Clone)]
pub enum MockIndexMode {
    /// Serve from the in-memory records.
    Healthy,
    /// Fail every call with [`KnowledgeError::Unavailable`].
    Down,
    /// Sleep before answering, for timeout tests.
    Slow(std::time::Duration),
}

/// In-memory index and source for tests.
///
/// Vector search is a brute-force cosine scan over the records, so it obeys
/// the same contract as the real indexes.
pub struct MockIndex {
    records: parking_lot::Mutex<Vec<KnowledgeRecord>>,
    mode: MockIndexMode,
    search_fails: bool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockIndex {
    pub fn new(records: Vec<KnowledgeRecord>) -> Self {
        Self {
            records: parking_lot::Mutex::new(records),
            mode: MockIndexMode::Healthy,
            search_fails: false,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_mode(mut self, mode: MockIndexMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail only `vector_search`; item reads keep working.
    pub fn with_failing_search(mut self) -> Self {
        self.search_fails = true;
        self
    }

    /// Number of trait calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.mode {
            MockIndexMode::Healthy => Ok(()),
            MockIndexMode::Down => Err(KnowledgeError::Unavailable("mock index down".to_string())),
            MockIndexMode::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn vector_search(
        &self,
        collection: Collection,
        query: &[f32],
        match_count: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>> {
        self.enter().await?;
        if self.search_fails {
            return Err(KnowledgeError::Remote {
                status: 500,
                message: "function match_faqs does not exist".to_string(),
            });
        }

        let records = self.records.lock();
        let mut matches: Vec<(i64, VectorMatch)> = records
            .iter()
            .filter(|r| r.active && r.item.collection() == collection)
            .filter_map(|r| {
                let embedding = r.embedding.as_deref()?;
                let similarity = carrivo_llm::cosine_similarity(query, embedding);
                (similarity > threshold).then(|| {
                    (
                        r.position,
                        VectorMatch {
                            id: r.id.clone(),
                            similarity,
                        },
                    )
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.1.similarity
                .partial_cmp(&a.1.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        Ok(matches
            .into_iter()
            .take(match_count)
            .map(|(_, m)| m)
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl KnowledgeSource for MockIndex {
    async fn fetch_active_items(
        &self,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>> {
        self.enter().await?;
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| r.active && r.item.collection() == collection)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_items(
        &self,
        collection: Collection,
        ids: &[ItemId],
    ) -> Result<Vec<KnowledgeRecord>> {
        self.enter().await?;
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| r.item.collection() == collection && ids.contains(&r.id))
            .cloned()
            .collect())
    }
}
