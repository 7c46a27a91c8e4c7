//! End-to-end behavior of the chat pipeline over a small bilingual FAQ set.
//!
//! `ConceptEmbedder` maps words onto a handful of topic axes in both scripts,
//! standing in for a multilingual sentence model: "freelancing" and
//! "فريلانسر" land on the same axis even though they share no characters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carrivo_domain::{
    ChatService, ConversationContextManager, DegradationEvent, DomainError, Intent, Language,
    LanguageHint,
};
use carrivo_knowledge::{
    Collection, FaqItem, KnowledgeItem, KnowledgeStore, MockIndex, MockIndexMode,
    RetrievalConfig, RetrievalOrchestrator, RetrievalTier, tokenize,
};
use carrivo_llm::{
    CompletionRequest, CompletionResponse, Embedder, EmbeddingPool, LlmBackend, MockBackend,
    MockResponse, PoolConfig, StopReason, Usage,
};
use carrivo_session::{HistoryConfig, HistoryStore, InMemoryTurnStore, TurnRole};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

const CONCEPTS: &[&[&str]] = &[
    &["ابدأ", "أبدأ", "ابدا", "start", "begin", "تبدأ"],
    &["البرمجة", "برمجة", "programming", "code"],
    &["freelancing", "freelancer", "فريلانسر", "كمستقل", "مستقل", "freelance"],
    &["تعلم", "اتعلم", "learn", "learning", "لتعلم"],
    &["بايثون", "python"],
    &["مشاريع", "projects", "مشاريعك"],
    &["portfolio", "بورتفوليو"],
    &["interview", "انترفيو", "مقابلة"],
    &["كاريفو", "carrivo"],
    &["english", "الإنجليزية", "الانجليزي"],
];

const DIMS: usize = 11;

struct ConceptEmbedder;

#[async_trait]
impl Embedder for ConceptEmbedder {
    async fn embed(&self, text: &str) -> carrivo_llm::Result<Vec<f32>> {
        let words = tokenize(text);
        let mut vector: Vec<f32> = CONCEPTS
            .iter()
            .map(|concept| words.iter().filter(|w| concept.contains(&w.as_str())).count() as f32)
            .collect();
        vector.push(0.1);
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(vector.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "concept"
    }
}

fn faq(
    question_ar: &str,
    question_ar_eg: Option<&str>,
    question_en: &str,
    answer_ar: &str,
    answer_en: &str,
) -> KnowledgeItem {
    KnowledgeItem::Faq(FaqItem {
        question_ar: question_ar.to_string(),
        answer_ar: answer_ar.to_string(),
        question_ar_eg: question_ar_eg.map(str::to_string),
        answer_ar_eg: None,
        question_en: question_en.to_string(),
        answer_en: answer_en.to_string(),
        category: None,
    })
}

fn faq_items() -> Vec<KnowledgeItem> {
    vec![
        faq(
            "كيف أبدأ في تعلم البرمجة؟",
            Some("ازاي ابدأ في البرمجة؟"),
            "How do I start learning programming?",
            "ابدأ بلغة مثل بايثون وطبق على مشاريع صغيرة.",
            "Start with Python and build small projects.",
        ),
        faq(
            "هل يمكنني العمل كمستقل؟",
            Some("ينفع اشتغل فريلانسر؟"),
            "Can a freelancer find clients online?",
            "اعمل بورتفوليو قوي ثم قدم على منصات العمل الحر.",
            "Build a strong portfolio, then bid on freelance platforms.",
        ),
        faq(
            "هل اللغة الإنجليزية مهمة للمبرمج؟",
            None,
            "Is English important for programmers?",
            "نعم، معظم المراجع مكتوبة بالإنجليزية.",
            "Yes, most documentation is written in English.",
        ),
        faq(
            "ما هو كاريفو؟",
            Some("كاريفو ده ايه؟"),
            "What is Carrivo?",
            "كاريفو منصة ترشدك في مسارك المهني.",
            "Carrivo is a platform that guides your tech career.",
        ),
    ]
}

fn pool() -> EmbeddingPool {
    EmbeddingPool::new(Arc::new(ConceptEmbedder), PoolConfig::default())
}

/// Store with every item embedded through the concept embedder.
async fn embedded_store() -> Arc<KnowledgeStore> {
    let store = KnowledgeStore::open_in_memory(DIMS).unwrap();
    for item in faq_items() {
        let embedding = ConceptEmbedder.embed(&item.embedding_text()).await.unwrap();
        store.insert(&item, Some(&embedding)).unwrap();
    }
    Arc::new(store)
}

fn context(turns: Arc<InMemoryTurnStore>) -> Arc<ConversationContextManager> {
    let history = HistoryStore::new(HistoryConfig::default().with_history_limit(64), turns);
    Arc::new(ConversationContextManager::new(history))
}

fn faq_question(result: &carrivo_knowledge::SearchResult) -> &str {
    match result.item() {
        KnowledgeItem::Faq(faq) => &faq.question_en,
        KnowledgeItem::Roadmap(roadmap) => &roadmap.title,
    }
}

/// Echoes the question back so replies can be matched to their turns.
struct EchoBackend;

#[async_trait]
impl LlmBackend for EchoBackend {
    async fn complete(&self, request: CompletionRequest) -> carrivo_llm::Result<CompletionResponse> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let question = prompt
            .split("Question: ")
            .nth(1)
            .and_then(|rest| rest.split("\n\nAnswer:").next())
            .unwrap_or("")
            .to_string();
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(CompletionResponse::new(
            "echo",
            "echo",
            format!("re: {question}"),
            StopReason::EndTurn,
            Usage::new(1, 1),
        ))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_egyptian_question_finds_its_entry_through_vector_index() {
    let store = embedded_store().await;
    let cascade =
        RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default()).with_index(store);

    let query = "ازاي ابدأ في البرمجة؟";
    let embedding = pool().embed(query, Some("ar_EG")).await.unwrap();
    let outcome = cascade.retrieve(query, Collection::Faq, Some(&embedding)).await;

    assert_eq!(outcome.tier, Some(RetrievalTier::RemoteVector));
    let top = &outcome.results[0];
    assert_eq!(faq_question(top), "How do I start learning programming?");
    assert!(top.score > 0.5, "score {}", top.score);
}

#[tokio::test]
async fn test_egyptian_question_finds_its_entry_through_local_scan() {
    let store = embedded_store().await;
    let cascade = RetrievalOrchestrator::new(store, RetrievalConfig::default());

    let query = "ازاي ابدأ في البرمجة؟";
    let embedding = pool().embed(query, Some("ar_EG")).await.unwrap();
    let outcome = cascade.retrieve(query, Collection::Faq, Some(&embedding)).await;

    assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
    assert_eq!(faq_question(&outcome.results[0]), "How do I start learning programming?");
    assert!(outcome.results[0].score > 0.5);
}

#[tokio::test]
async fn test_freelancing_needs_semantic_tiers() {
    let store = embedded_store().await;
    let cascade =
        RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default()).with_index(store);
    let query = "how do I start freelancing";

    let embedding = pool().embed(query, Some("en")).await.unwrap();
    let semantic = cascade.retrieve(query, Collection::Faq, Some(&embedding)).await;
    assert_eq!(semantic.tier, Some(RetrievalTier::RemoteVector));
    assert_eq!(
        faq_question(&semantic.results[0]),
        "Can a freelancer find clients online?"
    );

    // Word overlap alone prefers the programming entry.
    let lexical = cascade.retrieve(query, Collection::Faq, None).await;
    assert_eq!(lexical.tier, Some(RetrievalTier::Lexical));
    assert!(
        lexical
            .results
            .iter()
            .all(|r| faq_question(r) != "Can a freelancer find clients online?")
    );
}

#[tokio::test]
async fn test_double_outage_never_crashes() {
    let store = embedded_store().await;
    let cascade = RetrievalOrchestrator::new(store, RetrievalConfig::default())
        .with_index(Arc::new(MockIndex::new(Vec::new()).with_mode(MockIndexMode::Down)));

    for query in ["ازاي ابدأ في البرمجة؟", "احكيلي نكتة", "hello", "؟؟؟", "x"] {
        for collection in Collection::ALL {
            let outcome = cascade.retrieve(query, collection, None).await;
            assert!(
                outcome.is_empty() || outcome.tier == Some(RetrievalTier::Lexical),
                "{query}: {:?}",
                outcome.tier
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_grounds_egyptian_question() {
    let store = embedded_store().await;
    let turns = Arc::new(InMemoryTurnStore::new());
    let backend = Arc::new(MockBackend::with_text("ابدأ ببايثون واعمل مشاريع صغيرة."));
    let service = ChatService::new(
        context(turns.clone()),
        RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default()).with_index(store),
        backend.clone(),
    )
    .with_embeddings(pool());

    let response = service
        .process_message("s1", "ازاي ابدأ في البرمجة؟", LanguageHint::Auto)
        .await
        .unwrap();

    assert_eq!(response.intent, Intent::Faq);
    assert_eq!(response.tier, Some(RetrievalTier::RemoteVector));
    assert!(response.confidence > 0.5);
    assert!(response.degradations.is_empty(), "{:?}", response.degradations);
    assert_eq!(response.response_language, Language::Ar);

    // Arabic context: question and answer in Arabic labels.
    let prompt = &backend.requests()[0].messages[0].content;
    assert!(prompt.contains("س: كيف أبدأ في تعلم البرمجة؟"));

    let stored = turns.turns("s1");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].text, "ازاي ابدأ في البرمجة؟");
    assert_eq!(stored[1].text, "ابدأ ببايثون واعمل مشاريع صغيرة.");
}

#[tokio::test]
async fn test_chat_answers_ungrounded_when_everything_is_down() {
    let store = embedded_store().await;
    let turns = Arc::new(InMemoryTurnStore::new());
    let service = ChatService::new(
        context(turns.clone()),
        RetrievalOrchestrator::new(store, RetrievalConfig::default())
            .with_index(Arc::new(MockIndex::new(Vec::new()).with_mode(MockIndexMode::Down))),
        Arc::new(MockBackend::with_text("معلش، مش عندي معلومة عن ده.")),
    );

    let response = service
        .process_message("s1", "احكيلي نكتة", LanguageHint::Auto)
        .await
        .unwrap();

    assert!(!response.is_grounded());
    assert_eq!(response.tier, None);
    assert!((response.confidence - 0.3).abs() < f32::EPSILON);
    assert!(response.degradations.contains(&DegradationEvent::NoGrounding));
    assert!(
        response
            .degradations
            .iter()
            .any(|d| matches!(d, DegradationEvent::EmbeddingUnavailable(_)))
    );
    assert_eq!(turns.turns("s1").len(), 2);

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["degradations"][0]["kind"], "embedding_unavailable");
    assert_eq!(json["detected_language"], "ar");
}

#[tokio::test]
async fn test_failed_contextualization_falls_back_to_raw_message() {
    let store = embedded_store().await;
    let turns = Arc::new(InMemoryTurnStore::new());
    let history = HistoryStore::new(HistoryConfig::default(), turns.clone());
    let rewriter = Arc::new(MockBackend::new(vec![MockResponse::Error("rate limited".into())]));
    let context = Arc::new(ConversationContextManager::new(history).with_contextualizer(rewriter));
    let service = ChatService::new(
        context,
        RetrievalOrchestrator::new(store, RetrievalConfig::default()),
        Arc::new(MockBackend::new(vec![
            MockResponse::Text("Start with Python.".into()),
            MockResponse::Text("Build a portfolio.".into()),
        ])),
    )
    .with_embeddings(pool());

    // First turn has no history, so no rewrite is attempted.
    let first = service
        .process_message("s1", "how do I start learning programming", LanguageHint::Auto)
        .await
        .unwrap();
    assert!(!first.contextualized);
    assert!(first.degradations.is_empty(), "{:?}", first.degradations);

    let second = service
        .process_message("s1", "how do I start freelancing", LanguageHint::Auto)
        .await
        .unwrap();
    assert_eq!(second.query, "how do I start freelancing");
    assert!(!second.contextualized);
    assert!(
        second
            .degradations
            .iter()
            .any(|d| matches!(d, DegradationEvent::ContextualizationFailed(_)))
    );
    assert_eq!(second.tier, Some(RetrievalTier::LocalScan));
    assert_eq!(second.response_text, "Build a portfolio.");
}

#[tokio::test]
async fn test_generation_failure_keeps_history_consistent() {
    let store = embedded_store().await;
    let turns = Arc::new(InMemoryTurnStore::new());
    let service = ChatService::new(
        context(turns.clone()),
        RetrievalOrchestrator::new(store, RetrievalConfig::default()),
        Arc::new(MockBackend::failing()),
    );

    let err = service
        .process_message("s1", "how do I start learning programming", LanguageHint::Auto)
        .await
        .unwrap_err();
    let apology = err.apology().unwrap().to_string();
    assert!(matches!(err, DomainError::GenerationFailed { .. }));

    let stored = turns.turns("s1");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, TurnRole::User);
    assert_eq!(stored[1].text, apology);
    assert_eq!(stored[1].language, "en");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_stay_paired() {
    let store = embedded_store().await;
    let turns = Arc::new(InMemoryTurnStore::new());
    let service = ChatService::new(
        context(turns.clone()),
        RetrievalOrchestrator::new(store, RetrievalConfig::default()),
        Arc::new(EchoBackend),
    );

    let mut tasks = Vec::new();
    for i in 0..12 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .process_message("shared", &format!("question {i}"), LanguageHint::Auto)
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        let response = task.await.unwrap();
        assert!(response.response_text.starts_with("re: question "));
    }

    let stored = turns.turns("shared");
    assert_eq!(stored.len(), 24);
    for pair in stored.chunks(2) {
        assert_eq!(pair[0].role, TurnRole::User);
        assert_eq!(pair[1].role, TurnRole::Assistant);
        assert_eq!(pair[1].text, format!("re: {}", pair[0].text));
        assert!(pair[0].created_at <= pair[1].created_at);
    }
}
