//! Tiered retrieval cascade.
//!
//! ```text
//! query ──► Tier 1: VectorIndex (server-side kNN) ──ok, non-empty──► results
//!               │ no embedding / error / timeout / empty
//!               ▼
//!           Tier 2: LocalVectorScanner (cosine over fetched items)
//!               │ no embedding / empty
//!               ▼
//!           Tier 3: LexicalMatcher (word overlap) ──► results (possibly empty)
//! ```
//!
//! The first tier to return anything wins; lower tiers never run after a
//! success. Active items are fetched at most once per call and shared by
//! Tiers 2 and 3.

pub mod lexical;
pub mod local;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::KnowledgeError;
use crate::index::{SharedKnowledgeSource, SharedVectorIndex};
use crate::types::{Collection, KnowledgeRecord, RetrievalTier, SearchResult, VectorMatch};

pub use lexical::{LexicalMatcher, overlap_score, tokenize};
pub use local::LocalVectorScanner;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Cascade tuning.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum similarity (exclusive) for the vector tiers.
    pub threshold: f32,
    /// Minimum overlap (inclusive) for the lexical tier.
    pub lexical_threshold: f32,
    /// Results per FAQ query.
    pub k_faq: usize,
    /// Results per roadmap query.
    pub k_roadmaps: usize,
    /// Candidate cap for Tiers 2 and 3.
    pub scan_limit: usize,
    /// Bound on the whole Tier 1 round trip.
    pub remote_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            lexical_threshold: 0.3,
            k_faq: 5,
            k_roadmaps: 3,
            scan_limit: 200,
            remote_timeout: Duration::from_secs(3),
        }
    }
}

impl RetrievalConfig {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_lexical_threshold(mut self, threshold: f32) -> Self {
        self.lexical_threshold = threshold;
        self
    }

    pub fn with_k(mut self, k_faq: usize, k_roadmaps: usize) -> Self {
        self.k_faq = k_faq;
        self.k_roadmaps = k_roadmaps;
        self
    }

    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Result count for a collection.
    pub fn k_for(&self, collection: Collection) -> usize {
        match collection {
            Collection::Faq => self.k_faq,
            Collection::Roadmaps => self.k_roadmaps,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why a tier produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// No query embedding was available.
    NoEmbedding,
    /// The call did not finish in time.
    Timeout(Duration),
    /// The collaborator returned an error.
    Error(String),
    /// The tier ran but nothing passed its threshold.
    NoResults,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoEmbedding => write!(f, "no query embedding"),
            FailureReason::Timeout(d) => write!(f, "timed out after {:?}", d),
            FailureReason::Error(e) => write!(f, "{}", e),
            FailureReason::NoResults => write!(f, "no results above threshold"),
        }
    }
}

/// A tier that fell through.
#[derive(Debug, Clone, PartialEq)]
pub struct TierFailure {
    pub tier: RetrievalTier,
    pub reason: FailureReason,
}

impl TierFailure {
    fn new(tier: RetrievalTier, reason: FailureReason) -> Self {
        Self { tier, reason }
    }

    /// Whether the tier was unreachable rather than merely empty.
    pub fn is_outage(&self) -> bool {
        matches!(self.reason, FailureReason::Timeout(_) | FailureReason::Error(_))
    }
}

/// Result of one cascade run.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Ranked results, all from the same tier.
    pub results: Vec<SearchResult>,
    /// The tier that produced `results`, if any.
    pub tier: Option<RetrievalTier>,
    /// Tiers that fell through, in the order they were tried.
    pub failures: Vec<TierFailure>,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Score of the best result.
    pub fn top_score(&self) -> Option<f32> {
        self.results.first().map(|r| r.score)
    }
}

/// Sort by descending score, ties by creation order, and keep `k`.
pub(crate) fn rank(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.position.cmp(&b.record.position))
    });
    results.truncate(k);
    results
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the three-tier cascade for one `(query, collection)` pair.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    index: Option<SharedVectorIndex>,
    source: SharedKnowledgeSource,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    /// Cascade without a vector index; Tier 1 is skipped.
    pub fn new(source: SharedKnowledgeSource, config: RetrievalConfig) -> Self {
        Self {
            index: None,
            source,
            config,
        }
    }

    /// Use `index` for Tier 1. Its ids must resolve through the source.
    pub fn with_index(mut self, index: SharedVectorIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run the cascade. Never fails; an empty outcome is a valid answer.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: Collection,
        embedding: Option<&[f32]>,
    ) -> RetrievalOutcome {
        let k = self.config.k_for(collection);
        let mut outcome = RetrievalOutcome::default();

        // Tier 1
        if let Some(index) = &self.index {
            match embedding {
                Some(query_vec) => match self.remote_tier(index, collection, query_vec, k).await {
                    Ok(results) if !results.is_empty() => {
                        return self.finish(outcome, results, RetrievalTier::RemoteVector, collection);
                    }
                    Ok(_) => outcome.failures.push(TierFailure::new(
                        RetrievalTier::RemoteVector,
                        FailureReason::NoResults,
                    )),
                    Err(reason) => {
                        warn!(
                            collection = %collection,
                            index = index.name(),
                            reason = %reason,
                            "Remote vector search unavailable, falling back to local scan"
                        );
                        outcome
                            .failures
                            .push(TierFailure::new(RetrievalTier::RemoteVector, reason));
                    }
                },
                None => outcome.failures.push(TierFailure::new(
                    RetrievalTier::RemoteVector,
                    FailureReason::NoEmbedding,
                )),
            }
        }

        let candidates = match self
            .source
            .fetch_active_items(collection, self.config.scan_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Cannot fetch candidates; no local tiers");
                let reason = FailureReason::Error(e.to_string());
                outcome
                    .failures
                    .push(TierFailure::new(RetrievalTier::LocalScan, reason.clone()));
                outcome
                    .failures
                    .push(TierFailure::new(RetrievalTier::Lexical, reason));
                return outcome;
            }
        };

        // Tier 2
        match embedding {
            Some(query_vec) => {
                let results =
                    LocalVectorScanner::new(self.config.threshold).scan(query_vec, &candidates, k);
                if !results.is_empty() {
                    return self.finish(outcome, results, RetrievalTier::LocalScan, collection);
                }
                outcome.failures.push(TierFailure::new(
                    RetrievalTier::LocalScan,
                    FailureReason::NoResults,
                ));
            }
            None => outcome.failures.push(TierFailure::new(
                RetrievalTier::LocalScan,
                FailureReason::NoEmbedding,
            )),
        }

        // Tier 3
        let results = LexicalMatcher::new(self.config.lexical_threshold).rank(query, &candidates, k);
        if !results.is_empty() {
            return self.finish(outcome, results, RetrievalTier::Lexical, collection);
        }
        outcome.failures.push(TierFailure::new(
            RetrievalTier::Lexical,
            FailureReason::NoResults,
        ));

        debug!(collection = %collection, "All retrieval tiers empty");
        outcome
    }

    fn finish(
        &self,
        mut outcome: RetrievalOutcome,
        results: Vec<SearchResult>,
        tier: RetrievalTier,
        collection: Collection,
    ) -> RetrievalOutcome {
        debug!(
            collection = %collection,
            tier = %tier,
            results = results.len(),
            top_score = results.first().map(|r| r.score),
            "Retrieval tier selected"
        );
        outcome.results = results;
        outcome.tier = Some(tier);
        outcome
    }

    async fn remote_tier(
        &self,
        index: &SharedVectorIndex,
        collection: Collection,
        query: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<SearchResult>, FailureReason> {
        let timeout = self.config.remote_timeout;
        let threshold = self.config.threshold;

        let search = async {
            let matches = index.vector_search(collection, query, k, threshold).await?;
            if matches.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<_> = matches.iter().map(|m| m.id.clone()).collect();
            let records = self.source.get_items(collection, &ids).await?;
            Ok::<_, KnowledgeError>(resolve_matches(matches, records, threshold, k))
        };

        match tokio::time::timeout(timeout, search).await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(FailureReason::Error(e.to_string())),
            Err(_) => Err(FailureReason::Timeout(timeout)),
        }
    }
}

/// Join vector hits to their records, dropping unknown or inactive ids and
/// anything at or below the threshold.
fn resolve_matches(
    matches: Vec<VectorMatch>,
    records: Vec<KnowledgeRecord>,
    threshold: f32,
    k: usize,
) -> Vec<SearchResult> {
    let mut by_id: HashMap<_, _> = records.into_iter().map(|r| (r.id.clone(), r)).collect();
    let results = matches
        .into_iter()
        .filter(|m| m.similarity > threshold)
        .filter_map(|m| {
            let record = by_id.remove(&m.id)?;
            record.active.then_some(SearchResult {
                record,
                score: m.similarity.clamp(-1.0, 1.0),
                tier: RetrievalTier::RemoteVector,
            })
        })
        .collect();
    rank(results, k)
}
