//! Retrieval without generation, for inspection and tooling.

use carrivo_knowledge::{Collection, RetrievalOrchestrator, RetrievalOutcome};
use carrivo_llm::EmbeddingPool;
use tracing::warn;

use crate::intent::SharedIntentClassifier;
use crate::language::{HeuristicDetector, LanguageDetector};

/// Result of a search: the collection searched and the cascade outcome.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub collection: Collection,
    pub outcome: RetrievalOutcome,
    /// Why no query embedding was used, if one was wanted.
    pub embedding_error: Option<String>,
}

/// Runs the retrieval cascade for a raw query.
#[derive(Clone)]
pub struct SearchService {
    retrieval: RetrievalOrchestrator,
    embeddings: Option<EmbeddingPool>,
    classifier: SharedIntentClassifier,
}

impl SearchService {
    pub fn new(
        retrieval: RetrievalOrchestrator,
        embeddings: Option<EmbeddingPool>,
        classifier: SharedIntentClassifier,
    ) -> Self {
        Self {
            retrieval,
            embeddings,
            classifier,
        }
    }

    /// Search `collection`, or the one the query's intent points to.
    pub async fn search(&self, query: &str, collection: Option<Collection>) -> SearchReport {
        let collection = collection.unwrap_or_else(|| self.classifier.classify(query).collection());

        let (embedding, embedding_error) = match &self.embeddings {
            Some(pool) => {
                let language = HeuristicDetector::new().detect(query).language;
                match pool.embed(query, Some(language.code())).await {
                    Ok(embedding) => (Some(embedding), None),
                    Err(e) => {
                        warn!(error = %e, "Search without query embedding");
                        (None, Some(e.to_string()))
                    }
                }
            }
            None => (None, None),
        };

        let outcome = self
            .retrieval
            .retrieve(query, collection, embedding.as_deref())
            .await;

        SearchReport {
            collection,
            outcome,
            embedding_error,
        }
    }
}
