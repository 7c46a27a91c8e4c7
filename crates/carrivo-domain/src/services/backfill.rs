//! Embedding maintenance for the local knowledge store.
//!
//! Both operations embed through the shared [`EmbeddingPool`], one text at a
//! time, so they obey the same timeout and dimension checks as queries.

use std::sync::Arc;

use carrivo_knowledge::{BackfillReport, Collection, KnowledgeStore, ReindexReport};
use carrivo_llm::EmbeddingPool;
use tracing::debug;

use crate::error::Result;

async fn embed_all(
    pool: EmbeddingPool,
    texts: Vec<String>,
) -> std::result::Result<Vec<Vec<f32>>, String> {
    let mut embeddings = Vec::with_capacity(texts.len());
    for text in &texts {
        embeddings.push(pool.embed(text, None).await.map_err(|e| e.to_string())?);
    }
    Ok(embeddings)
}

/// Embed items of `collection` that have no vector yet, or all of them
/// with `force`.
pub async fn backfill_embeddings(
    store: &Arc<KnowledgeStore>,
    pool: &EmbeddingPool,
    collection: Collection,
    force: bool,
) -> Result<BackfillReport> {
    let report = store
        .backfill(collection, force, |texts| embed_all(pool.clone(), texts))
        .await?;
    debug!(collection = %collection, model = pool.model_name(), "Backfill used embedding pool");
    Ok(report)
}

/// Rebuild every vector, e.g. after the embedding model changed.
pub async fn reindex_embeddings(
    store: &Arc<KnowledgeStore>,
    pool: &EmbeddingPool,
) -> Result<ReindexReport> {
    let report = store.reindex(|texts| embed_all(pool.clone(), texts)).await?;
    debug!(model = pool.model_name(), "Reindex used embedding pool");
    Ok(report)
}
