//! Knowledge base storage and tiered retrieval for Carrivo.
//!
//! Roadmaps and bilingual FAQ entries live in one of two places: a remote
//! PostgREST (Supabase) project or a local SQLite file with sqlite-vec
//! tables. Either one can back the retrieval cascade.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  RetrievalOrchestrator                                               │
//! │    Tier 1  VectorIndex ─────────┬── RemoteIndex  (match_* RPCs)      │
//! │                                 └── KnowledgeStore (vec0 cosine)     │
//! │    Tier 2  LocalVectorScanner ──┐                                    │
//! │    Tier 3  LexicalMatcher ──────┴── KnowledgeSource::fetch_active    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use carrivo_knowledge::{Collection, KnowledgeStore, RetrievalConfig, RetrievalOrchestrator};
//!
//! # async fn run() -> carrivo_knowledge::Result<()> {
//! let store = Arc::new(KnowledgeStore::open("knowledge.db", 384)?);
//! let cascade = RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default())
//!     .with_index(store);
//!
//! let outcome = cascade.retrieve("backend roadmap", Collection::Roadmaps, None).await;
//! for hit in &outcome.results {
//!     println!("{} {:.2} ({})", hit.item().title(), hit.score, hit.tier);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod remote;
pub mod retrieval;
pub mod seed;
pub mod store;
pub mod types;
pub mod validation;
pub mod vector;

pub use error::{KnowledgeError, Result};
pub use index::{
    KnowledgeSource, MockIndex, MockIndexMode, SharedKnowledgeSource, SharedVectorIndex,
    VectorIndex,
};
pub use remote::{RemoteIndex, RemoteIndexConfig};
pub use retrieval::{
    FailureReason, LexicalMatcher, LocalVectorScanner, RetrievalConfig, RetrievalOrchestrator,
    RetrievalOutcome, TierFailure, tokenize,
};
pub use seed::{SeedData, SeedReport, seed_store};
pub use store::{BackfillReport, KnowledgeStore, ReindexReport};
pub use types::{
    Collection, FaqItem, ItemId, KnowledgeItem, KnowledgeRecord, RetrievalTier, RoadmapItem,
    SearchResult, VectorMatch,
};
pub use validation::{ValidationError, validate_embedding};
