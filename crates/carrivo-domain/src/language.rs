//! Language and dialect detection.
//!
//! The heuristic detector scores Egyptian-dialect markers first, then falls
//! back to the ratio of Arabic to Latin letters. It is stateless and cheap
//! enough to run on every message.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

// ─────────────────────────────────────────────────────────────────────────────
// Language
// ─────────────────────────────────────────────────────────────────────────────

/// Language of a message or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Egyptian Arabic.
    #[serde(rename = "ar_EG")]
    ArEg,
    /// Standard Arabic.
    #[serde(rename = "ar")]
    Ar,
    #[serde(rename = "en")]
    En,
    /// Arabic and Latin script in similar amounts.
    #[serde(rename = "mixed")]
    Mixed,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::ArEg => "ar_EG",
            Language::Ar => "ar",
            Language::En => "en",
            Language::Mixed => "mixed",
            Language::Unknown => "unknown",
        }
    }

    /// Whether replies can be written in this language.
    pub fn is_response_language(&self) -> bool {
        matches!(self, Language::ArEg | Language::Ar | Language::En)
    }

    pub fn is_dialect(&self) -> bool {
        matches!(self, Language::ArEg)
    }

    /// Arabic script is used for prompts and rendering.
    pub fn is_arabic(&self) -> bool {
        !matches!(self, Language::En)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ar_eg" | "eg" => Ok(Language::ArEg),
            "ar" => Ok(Language::Ar),
            "en" => Ok(Language::En),
            "mixed" => Ok(Language::Mixed),
            "unknown" => Ok(Language::Unknown),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// Caller preference for the reply language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LanguageHint {
    /// Follow the detected language.
    #[default]
    Auto,
    /// Always reply in this language.
    Explicit(Language),
}

impl std::str::FromStr for LanguageHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(LanguageHint::Auto);
        }
        s.parse().map(LanguageHint::Explicit)
    }
}

/// Pick the reply language.
///
/// An explicit hint naming a reply language wins. Otherwise the detected
/// language is used when replies can be written in it, then the session's
/// default language, then Egyptian Arabic.
pub fn resolve_response_language(
    hint: LanguageHint,
    detected: Language,
    session_default: Option<Language>,
) -> Language {
    if let LanguageHint::Explicit(lang) = hint
        && lang.is_response_language()
    {
        return lang;
    }
    if detected.is_response_language() {
        return detected;
    }
    session_default
        .filter(Language::is_response_language)
        .unwrap_or(Language::ArEg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Result of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub language: Language,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub is_dialect: bool,
}

impl Detection {
    pub fn new(language: Language, confidence: f32) -> Self {
        Self {
            language,
            confidence: confidence.clamp(0.0, 1.0),
            is_dialect: language.is_dialect(),
        }
    }
}

/// Classifies the language of a message.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Detection;
}

pub type SharedLanguageDetector = Arc<dyn LanguageDetector>;

const SHORT_ENGLISH: [&str; 6] = ["hi", "ok", "yes", "no", "hey", "hello"];

static EGYPTIAN_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(ازيك|إزيك|ازاى|إزاى|ايه|أيه)\b",
        r"\b(عامل ايه|عاملين ايه|عامل ايه ياسطا)\b",
        r"\b(تمام|ماشي|خلاص|بقا|يا عم|يا باشا)\b",
        r"\b(معلش|يا ريت|يعني|اصل|برضه|علشان)\b",
        r"\b(بص|اسمع|قول|روح|خش|جرب|شوف)\b",
        r"\b(فين|امتى|ليه|ازاي|كام|قد ايه)\b",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("egyptian marker regex"))
    .collect()
});

const EGYPTIAN_EDUCATION_TERMS: [&str; 14] = [
    "كليه", "جامعه", "دكتور", "مدرسه", "معهد", "توجيهي", "ثانويه", "ابتدائي", "اعدادي",
    "محاضره", "امتحان", "منهج", "ماده", "سكاشن",
];

/// Marker- and script-ratio based detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDetector;

impl HeuristicDetector {
    pub fn new() -> Self {
        Self
    }

    /// Weighted share of dialect markers: 0.7 marker families, 0.3 education vocabulary.
    pub fn egyptian_score(&self, text: &str) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let families = EGYPTIAN_MARKERS.iter().filter(|re| re.is_match(text)).count();
        let pattern_score = families as f32 / EGYPTIAN_MARKERS.len() as f32;

        let words: Vec<&str> = text.split_whitespace().collect();
        let education_hits = words
            .iter()
            .filter(|w| EGYPTIAN_EDUCATION_TERMS.contains(w))
            .count();
        let education_score = education_hits as f32 / words.len().max(1) as f32;

        pattern_score * 0.7 + education_score * 0.3
    }
}

impl LanguageDetector for HeuristicDetector {
    fn detect(&self, text: &str) -> Detection {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return Detection::new(Language::Unknown, 0.0);
        }
        if SHORT_ENGLISH.contains(&lower.as_str()) {
            return Detection::new(Language::En, 1.0);
        }

        let egyptian = self.egyptian_score(&lower);
        if egyptian > 0.6 {
            return Detection::new(Language::ArEg, egyptian);
        }

        let counts = ScriptCounts::of(text);
        let total = (counts.arabic + counts.latin + counts.other).max(1) as f32;
        let arabic_ratio = counts.arabic as f32 / total;
        let latin_ratio = counts.latin as f32 / total;

        if arabic_ratio > 0.5 {
            if egyptian > 0.3 {
                Detection::new(Language::ArEg, (arabic_ratio + egyptian) / 2.0)
            } else {
                Detection::new(Language::Ar, arabic_ratio)
            }
        } else if latin_ratio > 0.5 {
            Detection::new(Language::En, latin_ratio)
        } else if arabic_ratio > 0.2 && latin_ratio > 0.2 {
            Detection::new(Language::Mixed, (arabic_ratio + latin_ratio) / 2.0)
        } else if counts.latin > counts.arabic {
            Detection::new(Language::En, 0.4)
        } else if counts.arabic > counts.latin {
            Detection::new(Language::ArEg, 0.4)
        } else {
            Detection::new(Language::Unknown, 0.5)
        }
    }
}

#[derive(Debug, Default)]
struct ScriptCounts {
    arabic: usize,
    latin: usize,
    /// Punctuation and symbols.
    other: usize,
}

impl ScriptCounts {
    fn of(text: &str) -> Self {
        let mut counts = Self::default();
        for c in text.chars() {
            if is_arabic_char(c) {
                counts.arabic += 1;
            } else if c.is_ascii_alphabetic() {
                counts.latin += 1;
            }
            if !(c.is_alphanumeric() || c == '_' || c.is_whitespace()) {
                counts.other += 1;
            }
        }
        counts
    }
}

fn is_arabic_char(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}
