//! Intent routing between the roadmap and FAQ collections.
//!
//! A message either asks for a learning path (roadmap search) or is a
//! general question (FAQ search). Ambiguous messages go to the FAQ.

use carrivo_knowledge::Collection;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Roadmap,
    Faq,
}

impl Intent {
    /// The collection searched for this intent.
    pub fn collection(&self) -> Collection {
        match self {
            Intent::Roadmap => Collection::Roadmaps,
            Intent::Faq => Collection::Faq,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Roadmap => "roadmap",
            Intent::Faq => "faq",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Collection> for Intent {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::Roadmaps => Intent::Roadmap,
            Collection::Faq => Intent::Faq,
        }
    }
}

/// Decides which collection a query should search.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, query: &str) -> Intent;
}

pub type SharedIntentClassifier = Arc<dyn IntentClassifier>;

// Substring matches, so "مسارات" and "guides" count too.
static ROADMAP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(مسار|رود\s*ماب|خريطة|طريق)",
        r"(ازاي\s+اتعلم|كيف\s+اتعلم|عايز\s+اتعلم)",
        r"(roadmap|road\s*map|path|guide)",
        r"(how\s+to\s+learn|learning\s+path)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("roadmap intent regex"))
    .collect()
});

/// Keyword heuristics in Arabic, Egyptian Arabic and English.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, query: &str) -> Intent {
        let lower = query.to_lowercase();
        if ROADMAP_PATTERNS.iter().any(|re| re.is_match(&lower)) {
            Intent::Roadmap
        } else {
            Intent::Faq
        }
    }
}
