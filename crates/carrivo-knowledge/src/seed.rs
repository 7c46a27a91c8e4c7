//! Seed data for a fresh knowledge store.
//!
//! A small built-in bilingual set ships with the crate; larger sets load
//! from a JSON file of the same shape:
//!
//! ```json
//! { "roadmaps": [{ "title": "...", "slug": "...", ... }],
//!   "faqs": [{ "question_ar": "...", "answer_ar": "...", ... }] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{KnowledgeError, Result};
use crate::store::KnowledgeStore;
use crate::types::{Collection, FaqItem, KnowledgeItem, RoadmapItem};

/// Items to load into a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub roadmaps: Vec<RoadmapItem>,
    #[serde(default)]
    pub faqs: Vec<FaqItem>,
}

/// Counts from [`seed_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roadmaps_inserted: usize,
    pub faqs_inserted: usize,
    /// Items already present (same slug or same English question).
    pub skipped: usize,
}

impl SeedData {
    /// Parse a JSON seed file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KnowledgeError::InvalidData(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The built-in set.
    pub fn builtin() -> Self {
        Self {
            roadmaps: builtin_roadmaps(),
            faqs: builtin_faqs(),
        }
    }

    pub fn len(&self) -> usize {
        self.roadmaps.len() + self.faqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insert seed items without embeddings, skipping ones already present.
/// Run a backfill afterwards to make them searchable by vector.
pub fn seed_store(store: &KnowledgeStore, data: &SeedData) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for roadmap in &data.roadmaps {
        if roadmap.slug.trim().is_empty() || roadmap.title.trim().is_empty() {
            return Err(KnowledgeError::InvalidData(
                "roadmap seed needs a title and a slug".to_string(),
            ));
        }
        if store.roadmap_slug_exists(&roadmap.slug)? {
            debug!(slug = %roadmap.slug, "Roadmap already seeded");
            report.skipped += 1;
            continue;
        }
        store.insert(&KnowledgeItem::Roadmap(roadmap.clone()), None)?;
        report.roadmaps_inserted += 1;
    }

    let existing: Vec<String> = store
        .all_items(Collection::Faq)?
        .into_iter()
        .filter_map(|r| match r.item {
            KnowledgeItem::Faq(f) => Some(f.question_en.trim().to_lowercase()),
            KnowledgeItem::Roadmap(_) => None,
        })
        .collect();

    for faq in &data.faqs {
        if existing.contains(&faq.question_en.trim().to_lowercase()) {
            report.skipped += 1;
            continue;
        }
        store.insert(&KnowledgeItem::Faq(faq.clone()), None)?;
        report.faqs_inserted += 1;
    }

    info!(
        roadmaps = report.roadmaps_inserted,
        faqs = report.faqs_inserted,
        skipped = report.skipped,
        "Seeded knowledge store"
    );
    Ok(report)
}

fn builtin_roadmaps() -> Vec<RoadmapItem> {
    [
        ("frontend", "Frontend Developer", "Web Development"),
        ("backend", "Backend Developer", "Web Development"),
        ("full-stack", "Full Stack Developer", "Web Development"),
        ("devops", "DevOps Engineer", "DevOps"),
        ("android", "Android Developer", "Mobile Development"),
        ("flutter", "Flutter Developer", "Mobile Development"),
        ("python", "Python Developer", "Programming"),
        ("javascript", "JavaScript Developer", "Programming"),
        ("sql", "SQL", "Database"),
        ("cyber-security", "Cyber Security", "Security"),
        ("ux-design", "UX Design", "Design"),
        ("ai-data-scientist", "AI & Data Scientist", "AI/ML"),
        ("qa", "QA Engineer", "Testing"),
    ]
    .into_iter()
    .map(|(slug, title, category)| RoadmapItem {
        title: title.to_string(),
        description: format!("Step by step guide to becoming a {}", title),
        url: format!("https://roadmap.sh/{}", slug),
        category: category.to_string(),
        slug: slug.to_string(),
    })
    .collect()
}

fn faq(
    question_ar: &str,
    question_ar_eg: &str,
    question_en: &str,
    answer_ar: &str,
    answer_ar_eg: &str,
    answer_en: &str,
    category: &str,
) -> FaqItem {
    FaqItem {
        question_ar: question_ar.to_string(),
        answer_ar: answer_ar.to_string(),
        question_ar_eg: Some(question_ar_eg.to_string()),
        answer_ar_eg: Some(answer_ar_eg.to_string()),
        question_en: question_en.to_string(),
        answer_en: answer_en.to_string(),
        category: Some(category.to_string()),
    }
}

fn builtin_faqs() -> Vec<FaqItem> {
    vec![
        faq(
            "كيف أبدأ في تعلم البرمجة؟",
            "ازاي ابدأ في البرمجة؟",
            "How do I start learning programming?",
            "ابدأ بلغة سهلة مثل بايثون، وتعلم الأساسيات، ثم طبق ما تعلمته في مشاريع صغيرة.",
            "ابدأ بلغة سهلة زي بايثون، اتعلم الأساسيات، وبعدين اعمل مشاريع صغيرة.",
            "Begin with an approachable language such as Python, learn the fundamentals, then build small projects.",
            "programming",
        ),
        faq(
            "ما هي أفضل طريقة للعمل كمستقل؟",
            "عايز اشتغل فريلانسر، اعمل ايه؟",
            "What's the best way to begin working as a freelancer?",
            "كوّن معرض أعمال، واختر تخصصاً واضحاً، وأنشئ حسابات على منصات مثل مستقل وUpwork.",
            "اعمل بورتفوليو، اختار تخصص واضح، وافتح حساب على مستقل وUpwork.",
            "Build a portfolio, pick a niche, and create profiles on platforms like Mostaql and Upwork.",
            "career",
        ),
        faq(
            "ما هي أفضل لغة برمجة للمبتدئين؟",
            "ايه أحسن لغة برمجة اتعلمها الأول؟",
            "Which programming language should beginners pick first?",
            "بايثون خيار ممتاز للمبتدئين لسهولة قراءتها، وجافاسكريبت مناسبة لمن يريد تطوير الويب.",
            "بايثون حلوة جداً للمبتدئين عشان سهلة، ولو عايز ويب خد جافاسكريبت.",
            "Python is a great first choice because it reads easily; JavaScript suits anyone aiming at web development.",
            "programming",
        ),
        faq(
            "كيف أستعد لأول مقابلة عمل تقنية؟",
            "اجهز ازاي لأول انترفيو تقني؟",
            "How should I prepare for my first technical interview?",
            "راجع أساسيات هياكل البيانات والخوارزميات، وتدرب على حل المسائل، وجهز شرحاً لمشاريعك.",
            "راجع الداتا ستركتشر والألجوريزمز، حل مسائل كتير، وجهز تشرح مشاريعك.",
            "Review data structures and algorithms, practice solving problems, and be ready to walk through your projects.",
            "career",
        ),
        faq(
            "ما هو كاريفو؟",
            "يعني ايه كاريفو؟",
            "What is Carrivo?",
            "كاريفو منصة تساعدك على اختيار مسارك المهني في التقنية وتقدم لك خرائط تعلم وإجابات لأسئلتك.",
            "كاريفو منصة بتساعدك تختار مسارك في التك وبتديك رود ماب وإجابات لأسئلتك.",
            "Carrivo is a platform that helps you choose a tech career path, with learning roadmaps and answers to your questions.",
            "about",
        ),
        faq(
            "هل أحتاج إلى اللغة الإنجليزية لتعلم البرمجة؟",
            "لازم أكون شاطر في الانجليزي عشان اتعلم برمجة؟",
            "Is English required for learning to code?",
            "الإنجليزية تساعد كثيراً لأن معظم المصادر بها، لكن يمكنك البدء بمصادر عربية وتحسين لغتك تدريجياً.",
            "الانجليزي بيساعد جداً عشان أغلب المصادر بيه، بس ممكن تبدأ بمصادر عربي وتحسن مع الوقت.",
            "English helps a lot since most resources use it, but Arabic resources are fine to begin with while your English improves.",
            "programming",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_consistent() {
        let data = SeedData::builtin();
        assert!(!data.roadmaps.is_empty());
        assert!(!data.faqs.is_empty());
        assert!(
            data.faqs
                .iter()
                .any(|f| f.question_ar_eg.as_deref() == Some("ازاي ابدأ في البرمجة؟"))
        );
        assert!(data.roadmaps.iter().all(|r| r.url.starts_with("https://roadmap.sh/")));
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = KnowledgeStore::open_in_memory(4).unwrap();
        let data = SeedData::builtin();

        let first = seed_store(&store, &data).unwrap();
        assert_eq!(first.roadmaps_inserted, data.roadmaps.len());
        assert_eq!(first.faqs_inserted, data.faqs.len());

        let second = seed_store(&store, &data).unwrap();
        assert_eq!(second.roadmaps_inserted + second.faqs_inserted, 0);
        assert_eq!(second.skipped, data.len());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"faqs": [{"question_ar": "س", "answer_ar": "ج",
                          "question_en": "Q?", "answer_en": "A."}]}"#,
        )
        .unwrap();

        let data = SeedData::from_file(&path).unwrap();
        assert!(data.roadmaps.is_empty());
        assert_eq!(data.faqs.len(), 1);
        assert_eq!(data.faqs[0].question_eg(), "س");
        assert!(SeedData::from_file(dir.path().join("missing.json")).is_err());
    }
}
