//! Keyword-overlap fallback.
//!
//! Scores `|query ∩ item| / |query|` over lowercase word sets, so a query
//! whose every word appears in an item scores 1.0 regardless of item length.

use std::collections::HashSet;

use crate::types::{KnowledgeRecord, RetrievalTier, SearchResult};

use super::rank;

/// Split text into a set of lowercase words.
///
/// Words are maximal runs of alphanumeric characters in any script. Arabic
/// diacritics and tatweel are dropped first so vocalized and plain spellings
/// match.
pub fn tokenize(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !is_arabic_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    cleaned
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_arabic_mark(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{0640}')
}

/// Fraction of query words present in the item text.
pub fn overlap_score(query: &HashSet<String>, item: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(item).count() as f32 / query.len() as f32
}

/// Lexical ranking over a candidate set.
#[derive(Debug, Clone)]
pub struct LexicalMatcher {
    threshold: f32,
}

impl LexicalMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Keep candidates scoring at least the threshold, top `k` first.
    pub fn rank(&self, query: &str, candidates: &[KnowledgeRecord], k: usize) -> Vec<SearchResult> {
        let query_words = tokenize(query);
        if query_words.is_empty() {
            return Vec::new();
        }

        let scored = candidates
            .iter()
            .filter_map(|record| {
                let score = overlap_score(&query_words, &tokenize(&record.item.search_text()));
                (score > 0.0 && score >= self.threshold).then(|| SearchResult {
                    record: record.clone(),
                    score,
                    tier: RetrievalTier::Lexical,
                })
            })
            .collect();

        rank(scored, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, KnowledgeItem, RoadmapItem};
    use chrono::Utc;

    fn roadmap(position: i64, title: &str, description: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id: ItemId(format!("r{}", position)),
            item: KnowledgeItem::Roadmap(RoadmapItem {
                title: title.to_string(),
                description: description.to_string(),
                url: String::new(),
                category: String::new(),
                slug: format!("r{}", position),
            }),
            embedding: None,
            active: true,
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tokenize_mixed_scripts() {
        let words = tokenize("عايز اتعلم Python, بسرعة!");
        assert!(words.contains("عايز"));
        assert!(words.contains("python"));
        assert!(words.contains("بسرعة"));
        assert_eq!(words.len(), 4);
    }

    #[test]
    fn test_tokenize_strips_diacritics() {
        assert_eq!(tokenize("البَرْمَجَة"), tokenize("البرمجة"));
    }

    #[test]
    fn test_overlap_is_relative_to_query() {
        let q = tokenize("backend roadmap");
        let item = tokenize("the backend developer roadmap for beginners");
        assert_eq!(overlap_score(&q, &item), 1.0);
        assert_eq!(overlap_score(&tokenize("backend frontend"), &item), 0.5);
        assert_eq!(overlap_score(&HashSet::new(), &item), 0.0);
    }

    #[test]
    fn test_rank_applies_threshold_and_order() {
        let candidates = vec![
            roadmap(1, "Frontend", "html css javascript"),
            roadmap(2, "Backend", "servers databases apis"),
            roadmap(3, "DevOps", "servers deployment"),
        ];
        let results = LexicalMatcher::new(0.3).rank("servers and databases", &candidates, 5);

        let ids: Vec<_> = results.iter().map(|r| r.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
        assert!(results.iter().all(|r| r.tier == RetrievalTier::Lexical));
        assert!(LexicalMatcher::new(0.3).rank("???", &candidates, 5).is_empty());
    }
}
