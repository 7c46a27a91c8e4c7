//! Context assembly for grounded generation.
//!
//! Turns the ranked [`SearchResult`]s of one retrieval into a bounded text
//! block in the reply language:
//!
//! 1. Render each item in the reply language (FAQ as `Q:`/`A:` or `س:`/`ج:`)
//! 2. Drop near-duplicates; the earlier-ranked copy wins
//! 3. Add items in rank order until the character budget is reached
//!
//! An empty result list produces no block at all.

use carrivo_knowledge::{
    Collection, FaqItem, KnowledgeItem, RetrievalTier, RoadmapItem, SearchResult, tokenize,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::language::Language;
use crate::links::{extract_urls, url_spans};

/// Default character budget of a context block.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 4_000;

/// Token Jaccard similarity at or above which two items count as duplicates.
pub const DEFAULT_DEDUP_JACCARD: f32 = 0.9;

const ITEM_SEPARATOR: &str = "\n\n";

/// A knowledge item that informed a reply, for citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub collection: Collection,
    pub title: String,
    pub tier: RetrievalTier,
    pub score: f32,
}

impl SourceRef {
    pub fn from_result(result: &SearchResult) -> Self {
        Self {
            id: result.id().to_string(),
            collection: result.item().collection(),
            title: result.item().title().to_string(),
            tier: result.tier,
            score: result.score,
        }
    }
}

/// Deduplicated, size-bounded grounding text for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub text: String,
    /// Items included in `text`, in rank order.
    pub sources: Vec<SourceRef>,
    /// Links of the included items; the only links a reply may contain.
    pub urls: Vec<String>,
    /// Items dropped as near-duplicates.
    pub duplicates: usize,
    /// Whether any item was dropped or cut to fit the budget.
    pub truncated: bool,
}

/// Builds [`ContextBlock`]s.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    char_budget: usize,
    dedup_jaccard: f32,
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self {
            char_budget: DEFAULT_CONTEXT_CHAR_BUDGET,
            dedup_jaccard: DEFAULT_DEDUP_JACCARD,
        }
    }
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_char_budget(mut self, budget: usize) -> Self {
        self.char_budget = budget.max(1);
        self
    }

    pub fn with_dedup_threshold(mut self, jaccard: f32) -> Self {
        self.dedup_jaccard = jaccard.clamp(0.0, 1.0);
        self
    }

    pub fn char_budget(&self) -> usize {
        self.char_budget
    }

    /// Build the block, or `None` when there is nothing to ground on.
    pub fn assemble(&self, results: &[SearchResult], language: Language) -> Option<ContextBlock> {
        if results.is_empty() {
            return None;
        }

        let mut kept: Vec<(String, HashSet<String>, &SearchResult)> = Vec::new();
        let mut duplicates = 0;
        for result in results {
            let rendered = render_item(result.item(), language);
            let tokens = tokenize(&rendered);
            let is_duplicate = kept.iter().any(|(text, seen, _)| {
                normalize_text(text) == normalize_text(&rendered)
                    || jaccard(seen, &tokens) >= self.dedup_jaccard
            });
            if is_duplicate {
                duplicates += 1;
                continue;
            }
            kept.push((rendered, tokens, result));
        }

        let mut text = String::new();
        let mut used = 0usize;
        let mut sources = Vec::new();
        let mut urls: Vec<String> = Vec::new();
        let mut truncated = false;
        for (rendered, _, result) in &kept {
            let separator = if text.is_empty() { 0 } else { ITEM_SEPARATOR.chars().count() };
            let cost = separator + rendered.chars().count();

            if used + cost > self.char_budget {
                truncated = true;
                if text.is_empty() {
                    // The top item alone is over budget: keep a prefix of it.
                    text = truncate_outside_urls(rendered, self.char_budget);
                    sources.push(SourceRef::from_result(result));
                    push_urls(&mut urls, rendered);
                }
                break;
            }

            if !text.is_empty() {
                text.push_str(ITEM_SEPARATOR);
            }
            text.push_str(rendered);
            used += cost;
            sources.push(SourceRef::from_result(result));
            push_urls(&mut urls, rendered);
        }

        Some(ContextBlock {
            text,
            sources,
            urls,
            duplicates,
            truncated,
        })
    }
}

/// Links of an included item, taken from its full rendering.
fn push_urls(urls: &mut Vec<String>, rendered: &str) {
    for url in extract_urls(rendered) {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
}

/// First `budget` chars of `text`, shortened further so no link is cut.
fn truncate_outside_urls(text: &str, budget: usize) -> String {
    let mut cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    if let Some(span) = url_spans(text).find(|span| span.start < cut && cut < span.end) {
        cut = span.start;
    }
    text[..cut].trim_end().to_string()
}

/// Render one item in the reply language.
pub fn render_item(item: &KnowledgeItem, language: Language) -> String {
    match item {
        KnowledgeItem::Faq(faq) => render_faq(faq, language),
        KnowledgeItem::Roadmap(roadmap) => render_roadmap(roadmap, language),
    }
}

fn render_faq(faq: &FaqItem, language: Language) -> String {
    match language {
        Language::En => format!(
            "Q: {}\nA: {}",
            or_fallback(&faq.question_en, &faq.question_ar),
            or_fallback(&faq.answer_en, &faq.answer_ar)
        ),
        Language::Ar => format!("س: {}\nج: {}", faq.question_ar, faq.answer_ar),
        Language::ArEg | Language::Mixed | Language::Unknown => {
            format!("س: {}\nج: {}", faq.question_eg(), faq.answer_eg())
        }
    }
}

fn render_roadmap(roadmap: &RoadmapItem, language: Language) -> String {
    let mut text = match language {
        Language::En => format!(
            "Q: What is the {} roadmap?\nA: {}",
            roadmap.title, roadmap.description
        ),
        Language::Ar | Language::ArEg | Language::Mixed | Language::Unknown => format!(
            "س: ما هو مسار {}؟\nج: {}",
            roadmap.title, roadmap.description
        ),
    };
    if !roadmap.url.trim().is_empty() {
        let label = if language == Language::En { "Link" } else { "الرابط" };
        text.push_str(&format!("\n{}: {}", label, roadmap.url.trim()));
    }
    text
}

fn or_fallback<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() {
        fallback
    } else {
        preferred
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}
