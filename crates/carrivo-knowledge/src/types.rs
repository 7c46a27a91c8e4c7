//! Knowledge base data model.
//!
//! Items come in two closed variants, roadmaps and FAQ entries, and always
//! belong to exactly one [`Collection`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Collections
// ─────────────────────────────────────────────────────────────────────────────

/// A searchable knowledge collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Roadmaps,
    Faq,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Roadmaps, Collection::Faq];

    /// Table name, both locally and on the remote index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Roadmaps => "roadmaps",
            Collection::Faq => "faq",
        }
    }

    /// Name of the remote similarity-search RPC for this collection.
    pub fn rpc_name(&self) -> &'static str {
        match self {
            Collection::Roadmaps => "match_roadmaps",
            Collection::Faq => "match_faqs",
        }
    }

    /// Column holding the visibility flag.
    pub fn active_column(&self) -> &'static str {
        match self {
            Collection::Roadmaps => "is_published",
            Collection::Faq => "is_active",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "roadmaps" | "roadmap" => Ok(Collection::Roadmaps),
            "faq" | "faqs" => Ok(Collection::Faq),
            other => Err(format!("unknown collection '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Items
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A curated learning path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    pub slug: String,
}

/// A question/answer entry in standard Arabic, Egyptian Arabic and English.
///
/// Egyptian fields are optional and fall back to standard Arabic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    pub question_ar: String,
    pub answer_ar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_ar_eg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_ar_eg: Option<String>,
    pub question_en: String,
    pub answer_en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FaqItem {
    /// Egyptian question, or the standard Arabic one.
    pub fn question_eg(&self) -> &str {
        non_empty(self.question_ar_eg.as_deref()).unwrap_or(&self.question_ar)
    }

    /// Egyptian answer, or the standard Arabic one.
    pub fn answer_eg(&self) -> &str {
        non_empty(self.answer_ar_eg.as_deref()).unwrap_or(&self.answer_ar)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Any item in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KnowledgeItem {
    Roadmap(RoadmapItem),
    Faq(FaqItem),
}

impl KnowledgeItem {
    /// The collection this item lives in.
    pub fn collection(&self) -> Collection {
        match self {
            KnowledgeItem::Roadmap(_) => Collection::Roadmaps,
            KnowledgeItem::Faq(_) => Collection::Faq,
        }
    }

    /// Short human label for citations.
    pub fn title(&self) -> &str {
        match self {
            KnowledgeItem::Roadmap(r) => &r.title,
            KnowledgeItem::Faq(f) if !f.question_en.trim().is_empty() => &f.question_en,
            KnowledgeItem::Faq(f) => &f.question_ar,
        }
    }

    /// Every textual field, used for lexical matching.
    pub fn search_text(&self) -> String {
        match self {
            KnowledgeItem::Roadmap(r) => {
                [&r.title, &r.description, &r.category, &r.slug].map(|s| s.as_str()).join(" ")
            }
            KnowledgeItem::Faq(f) => {
                let mut parts = vec![f.question_ar.as_str(), f.answer_ar.as_str()];
                parts.extend(f.question_ar_eg.as_deref());
                parts.extend(f.answer_ar_eg.as_deref());
                parts.extend([f.question_en.as_str(), f.answer_en.as_str()]);
                parts.extend(f.category.as_deref());
                parts.join(" ")
            }
        }
    }

    /// Text fed to the embedding model for this item.
    pub fn embedding_text(&self) -> String {
        match self {
            KnowledgeItem::Roadmap(r) => format!("{} {} {}", r.title, r.description, r.category)
                .trim()
                .to_string(),
            KnowledgeItem::Faq(f) => {
                let mut parts = vec![f.question_ar.as_str()];
                parts.extend(non_empty(f.question_ar_eg.as_deref()));
                parts.extend([
                    f.question_en.as_str(),
                    f.answer_ar.as_str(),
                    f.answer_en.as_str(),
                ]);
                parts
                    .into_iter()
                    .filter(|p| !p.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    }
}

/// A stored item with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: ItemId,
    pub item: KnowledgeItem,
    /// Stored embedding, if one has been generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub active: bool,
    /// Monotone creation order, used to break score ties.
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval results
// ─────────────────────────────────────────────────────────────────────────────

/// Which cascade tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalTier {
    RemoteVector,
    LocalScan,
    Lexical,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::RemoteVector => "remote_vector",
            RetrievalTier::LocalScan => "local_scan",
            RetrievalTier::Lexical => "lexical",
        }
    }
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked hit from a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: ItemId,
    pub similarity: f32,
}

/// One retrieved item with its score and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub record: KnowledgeRecord,
    /// Similarity (vector tiers) or overlap ratio (lexical), in `[0, 1]`.
    pub score: f32,
    pub tier: RetrievalTier,
}

impl SearchResult {
    pub fn id(&self) -> &ItemId {
        &self.record.id
    }

    pub fn item(&self) -> &KnowledgeItem {
        &self.record.item
    }
}
