//! Vector index, embedding backfill and reindex.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{KnowledgeError, Result};
use crate::index::VectorIndex;
use crate::types::{Collection, ItemId, VectorMatch};
use crate::validation::validate_embedding;
use crate::vector;

use super::KnowledgeStore;

const DIMENSIONS_KEY: &str = "embedding.dimensions";

/// Texts per embed call during backfill and reindex.
const BATCH_SIZE: usize = 32;

/// Report from [`KnowledgeStore::backfill`].
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Items that needed an embedding.
    pub candidates: usize,
    /// Items that received one.
    pub embedded: usize,
    /// Items skipped (empty text or an invalid vector).
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Report from [`KnowledgeStore::reindex`].
#[derive(Debug, Clone, Default)]
pub struct ReindexReport {
    /// Items across both collections.
    pub total: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl KnowledgeStore {
    /// Create the vec0 tables, or mark vectors stale if the file was built
    /// for another dimension.
    pub(super) fn init_vectors(&self) -> Result<()> {
        let conn = self.conn.lock();

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![DIMENSIONS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(old_dims) = stored.and_then(|s| s.parse::<usize>().ok()) {
            if old_dims != self.dims {
                warn!(
                    stored = old_dims,
                    configured = self.dims,
                    "Embedding dimension mismatch; vector search disabled until reindex"
                );
                *self.vectors_stale.lock() = Some(old_dims);
                return Ok(());
            }
        }

        for collection in Collection::ALL {
            vector::create_vector_table(&conn, collection, self.dims)?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![DIMENSIONS_KEY, self.dims.to_string()],
        )?;
        Ok(())
    }

    /// Whether stored vectors were built for a different dimension.
    pub fn vectors_stale(&self) -> bool {
        self.vectors_stale.lock().is_some()
    }

    pub(crate) fn ensure_vectors_fresh(&self) -> Result<()> {
        match *self.vectors_stale.lock() {
            Some(stored) => Err(KnowledgeError::StaleVectors {
                stored,
                configured: self.dims,
            }),
            None => Ok(()),
        }
    }

    /// Number of vectors in the collection's index.
    pub fn indexed_count(&self, collection: Collection) -> Result<usize> {
        self.ensure_vectors_fresh()?;
        let conn = self.conn.lock();
        vector::count_embeddings(&conn, collection)
    }

    /// Ids and embedding texts of items lacking an embedding (or all, with
    /// `force`), in creation order.
    pub fn items_missing_embeddings(
        &self,
        collection: Collection,
        force: bool,
    ) -> Result<Vec<(ItemId, String)>> {
        let records = self.all_items(collection)?;
        Ok(records
            .into_iter()
            .filter(|r| {
                force
                    || r.embedding
                        .as_ref()
                        .is_none_or(|e| e.len() != self.dims)
            })
            .map(|r| (r.id, r.item.embedding_text()))
            .collect())
    }

    /// Generate embeddings for items that have none.
    ///
    /// `embed_batch` receives a batch of texts and returns one vector per
    /// text, which keeps this crate independent of any embedding provider.
    pub async fn backfill<F, Fut>(
        &self,
        collection: Collection,
        force: bool,
        embed_batch: F,
    ) -> Result<BackfillReport>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<Vec<f32>>, String>>,
    {
        self.ensure_vectors_fresh()?;
        let start = Instant::now();
        let pending = self.items_missing_embeddings(collection, force)?;

        let mut report = BackfillReport {
            candidates: pending.len(),
            ..Default::default()
        };
        let (embedded, skipped) = self.embed_in_batches(collection, &pending, &embed_batch).await?;
        report.embedded = embedded;
        report.skipped = skipped;
        report.elapsed = start.elapsed();

        info!(
            collection = %collection,
            candidates = report.candidates,
            embedded = report.embedded,
            skipped = report.skipped,
            "Backfill complete"
        );
        Ok(report)
    }

    /// Drop every vector and re-embed all items at the configured dimension.
    pub async fn reindex<F, Fut>(&self, embed_batch: F) -> Result<ReindexReport>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<Vec<f32>>, String>>,
    {
        let start = Instant::now();

        {
            let conn = self.conn.lock();
            let tx = conn.unchecked_transaction()?;
            for collection in Collection::ALL {
                vector::drop_vector_table(&tx, collection)?;
                vector::create_vector_table(&tx, collection, self.dims)?;
                tx.execute(
                    &format!("UPDATE {} SET embedding = NULL", collection.as_str()),
                    [],
                )?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![DIMENSIONS_KEY, self.dims.to_string()],
            )?;
            tx.commit()?;
        }
        *self.vectors_stale.lock() = None;

        let mut report = ReindexReport::default();
        for collection in Collection::ALL {
            let pending = self.items_missing_embeddings(collection, true)?;
            report.total += pending.len();
            let (embedded, skipped) =
                self.embed_in_batches(collection, &pending, &embed_batch).await?;
            report.embedded += embedded;
            report.skipped += skipped;
        }
        report.elapsed = start.elapsed();

        info!(
            total = report.total,
            embedded = report.embedded,
            dims = self.dims,
            "Reindex complete"
        );
        Ok(report)
    }

    async fn embed_in_batches<F, Fut>(
        &self,
        collection: Collection,
        pending: &[(ItemId, String)],
        embed_batch: &F,
    ) -> Result<(usize, usize)>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<Vec<f32>>, String>>,
    {
        let mut embedded = 0usize;
        let mut skipped = 0usize;

        for chunk in pending.chunks(BATCH_SIZE) {
            let non_empty: Vec<&(ItemId, String)> =
                chunk.iter().filter(|(_, text)| !text.trim().is_empty()).collect();
            skipped += chunk.len() - non_empty.len();
            if non_empty.is_empty() {
                continue;
            }

            let texts = non_empty.iter().map(|(_, t)| t.clone()).collect();
            // The lock is never held across this await
            let embeddings = embed_batch(texts)
                .await
                .map_err(|e| KnowledgeError::InvalidData(format!("Embedding failed: {e}")))?;
            if embeddings.len() != non_empty.len() {
                return Err(KnowledgeError::InvalidData(format!(
                    "embedder returned {} vectors for {} texts",
                    embeddings.len(),
                    non_empty.len()
                )));
            }

            let conn = self.conn.lock();
            let tx = conn.unchecked_transaction()?;
            for ((id, _), embedding) in non_empty.iter().copied().zip(embeddings.iter()) {
                if let Err(e) = validate_embedding(embedding, self.dims) {
                    warn!(id = %id, error = %e, "Skipping invalid embedding");
                    skipped += 1;
                    continue;
                }
                let (rows, active) = Self::write_embedding_blob(&tx, collection, id, embedding)?;
                if rows == 0 {
                    skipped += 1;
                    continue;
                }
                if active {
                    vector::store_embedding(&tx, collection, id, embedding)?;
                }
                embedded += 1;
            }
            tx.commit()?;
            debug!(collection = %collection, embedded, "Embedded batch");
        }

        Ok((embedded, skipped))
    }
}

#[async_trait]
impl VectorIndex for KnowledgeStore {
    async fn vector_search(
        &self,
        collection: Collection,
        query: &[f32],
        match_count: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>> {
        self.ensure_vectors_fresh()?;
        validate_embedding(query, self.dims)?;
        if match_count == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        vector::search_similar(&conn, collection, query, match_count, threshold)
    }

    fn name(&self) -> &str {
        "sqlite-vec"
    }
}
