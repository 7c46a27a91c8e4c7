//! Client-side cosine scan over stored embeddings.

use carrivo_llm::cosine_similarity;

use crate::types::{KnowledgeRecord, RetrievalTier, SearchResult};

use super::rank;

/// Brute-force similarity over a candidate set.
#[derive(Debug, Clone)]
pub struct LocalVectorScanner {
    threshold: f32,
}

impl LocalVectorScanner {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Score every candidate carrying an embedding of the query's length,
    /// keep `similarity > threshold` and return the top `k`.
    pub fn scan(&self, query: &[f32], candidates: &[KnowledgeRecord], k: usize) -> Vec<SearchResult> {
        if query.is_empty() {
            return Vec::new();
        }

        let scored = candidates
            .iter()
            .filter_map(|record| {
                let embedding = record.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    return None;
                }
                let similarity = cosine_similarity(query, embedding);
                (similarity > self.threshold).then(|| SearchResult {
                    record: record.clone(),
                    score: similarity,
                    tier: RetrievalTier::LocalScan,
                })
            })
            .collect();

        rank(scored, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaqItem, ItemId, KnowledgeItem};
    use chrono::Utc;

    fn record(position: i64, embedding: Option<Vec<f32>>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: ItemId(format!("item-{}", position)),
            item: KnowledgeItem::Faq(FaqItem {
                question_ar: String::new(),
                answer_ar: String::new(),
                question_ar_eg: None,
                answer_ar_eg: None,
                question_en: format!("q{}", position),
                answer_en: String::new(),
                category: None,
            }),
            embedding,
            active: true,
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_self_similarity_ranks_first() {
        let candidates = vec![
            record(1, Some(vec![0.6, 0.8, 0.0])),
            record(2, Some(vec![1.0, 0.0, 0.0])),
        ];
        let results = LocalVectorScanner::new(0.5).scan(&[1.0, 0.0, 0.0], &candidates, 5);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id().as_str(), "item-2");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results.iter().all(|r| r.tier == RetrievalTier::LocalScan));
    }

    #[test]
    fn test_skips_missing_and_wrong_dimension() {
        let candidates = vec![
            record(1, None),
            record(2, Some(vec![1.0, 0.0])),
            record(3, Some(vec![1.0, 0.0, 0.0])),
        ];
        let results = LocalVectorScanner::new(0.5).scan(&[1.0, 0.0, 0.0], &candidates, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id().as_str(), "item-3");
    }

    #[test]
    fn test_ties_break_by_creation_order() {
        let candidates = vec![
            record(9, Some(vec![1.0, 0.0])),
            record(3, Some(vec![1.0, 0.0])),
            record(5, Some(vec![1.0, 0.0])),
        ];
        let results = LocalVectorScanner::new(0.5).scan(&[1.0, 0.0], &candidates, 2);
        let ids: Vec<_> = results.iter().map(|r| r.record.position).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let candidates = vec![record(1, Some(vec![1.0, 0.0]))];
        // cos = 0 for orthogonal vectors
        assert!(LocalVectorScanner::new(0.0).scan(&[0.0, 1.0], &candidates, 5).is_empty());
    }
}
