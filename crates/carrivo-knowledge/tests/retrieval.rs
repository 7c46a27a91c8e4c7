//! Cascade properties over the SQLite store and the mock index.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use carrivo_knowledge::{
    Collection, FailureReason, FaqItem, ItemId, KnowledgeItem, KnowledgeRecord, KnowledgeStore,
    MockIndex, MockIndexMode, RetrievalConfig, RetrievalOrchestrator, RetrievalTier, RoadmapItem,
};

fn faq(question_en: &str, answer_en: &str) -> KnowledgeItem {
    KnowledgeItem::Faq(FaqItem {
        question_ar: "سؤال".to_string(),
        answer_ar: "جواب".to_string(),
        question_ar_eg: None,
        answer_ar_eg: None,
        question_en: question_en.to_string(),
        answer_en: answer_en.to_string(),
        category: None,
    })
}

fn roadmap(slug: &str) -> KnowledgeItem {
    KnowledgeItem::Roadmap(RoadmapItem {
        title: format!("{} developer", slug),
        description: format!("Step by step guide to becoming a {} developer", slug),
        url: format!("https://roadmap.sh/{}", slug),
        category: "Web Development".to_string(),
        slug: slug.to_string(),
    })
}

fn record(position: i64, item: KnowledgeItem, embedding: Option<Vec<f32>>) -> KnowledgeRecord {
    KnowledgeRecord {
        id: ItemId(format!("item-{}", position)),
        item,
        embedding,
        active: true,
        position,
        created_at: Utc::now(),
    }
}

/// Four FAQ entries at increasing angles from the x axis.
fn fan_vectors() -> Vec<Vec<f32>> {
    vec![
        vec![1.0, 0.0, 0.0],
        vec![0.9, 0.436, 0.0],
        vec![0.6, 0.8, 0.0],
        vec![0.0, 0.0, 1.0],
    ]
}

fn seeded_store() -> (Arc<KnowledgeStore>, Vec<ItemId>) {
    let store = Arc::new(KnowledgeStore::open_in_memory(3).unwrap());
    let ids = fan_vectors()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            store
                .insert(&faq(&format!("question {}", i), "answer"), Some(v))
                .unwrap()
        })
        .collect();
    (store, ids)
}

fn mock_records() -> Vec<KnowledgeRecord> {
    fan_vectors()
        .into_iter()
        .enumerate()
        .map(|(i, v)| record(i as i64 + 1, faq(&format!("question {}", i), "answer"), Some(v)))
        .collect()
}

#[tokio::test]
async fn test_self_similarity_through_vector_index() {
    let (store, ids) = seeded_store();
    let cascade = RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default())
        .with_index(store.clone());

    for (vector, id) in fan_vectors().iter().zip(&ids) {
        let outcome = cascade.retrieve("anything", Collection::Faq, Some(vector)).await;
        assert_eq!(outcome.tier, Some(RetrievalTier::RemoteVector));
        assert_eq!(outcome.results[0].id(), id);
        assert!(outcome.results[0].score >= 0.99);
    }
}

#[tokio::test]
async fn test_self_similarity_through_local_scan() {
    let (store, ids) = seeded_store();
    let cascade = RetrievalOrchestrator::new(store, RetrievalConfig::default());

    for (vector, id) in fan_vectors().iter().zip(&ids) {
        let outcome = cascade.retrieve("anything", Collection::Faq, Some(vector)).await;
        assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
        assert_eq!(outcome.results[0].id(), id);
        assert!(outcome.results[0].score >= 0.99);
    }
}

#[tokio::test]
async fn test_threshold_monotonicity() {
    let (store, _) = seeded_store();
    let query = [0.8, 0.6, 0.0];
    let thresholds = [0.0, 0.3, 0.5, 0.7, 0.9, 0.99];

    for use_index in [true, false] {
        let mut previous: Option<Vec<ItemId>> = None;
        for threshold in thresholds {
            let config = RetrievalConfig::default()
                .with_threshold(threshold)
                .with_k(10, 10);
            let mut cascade = RetrievalOrchestrator::new(store.clone(), config);
            if use_index {
                cascade = cascade.with_index(store.clone());
            }

            let outcome = cascade.retrieve("", Collection::Faq, Some(&query)).await;
            let ids: Vec<ItemId> = outcome.results.iter().map(|r| r.id().clone()).collect();
            assert!(outcome.results.iter().all(|r| r.score > threshold));

            if let Some(prev) = &previous {
                assert!(
                    ids.iter().all(|id| prev.contains(id)),
                    "results at {} not a subset of the lower threshold",
                    threshold
                );
            }
            previous = Some(ids);
        }
    }
}

#[tokio::test]
async fn test_remote_outage_falls_to_local_scan_deterministically() {
    let records = mock_records();
    let source = Arc::new(MockIndex::new(records.clone()));
    let down = Arc::new(MockIndex::new(records).with_mode(MockIndexMode::Down));

    let degraded = RetrievalOrchestrator::new(source.clone(), RetrievalConfig::default())
        .with_index(down.clone());
    let local_only = RetrievalOrchestrator::new(source, RetrievalConfig::default());

    let query = [0.95, 0.3, 0.0];
    let first = degraded.retrieve("question", Collection::Faq, Some(&query)).await;
    let second = degraded.retrieve("question", Collection::Faq, Some(&query)).await;
    let reference = local_only.retrieve("question", Collection::Faq, Some(&query)).await;

    assert_eq!(first.tier, Some(RetrievalTier::LocalScan));
    assert_eq!(first.results, second.results);
    assert_eq!(first.results, reference.results);
    assert!(first.failures[0].is_outage());
    assert_eq!(first.failures[0].tier, RetrievalTier::RemoteVector);
    assert_eq!(down.call_count(), 2);
}

#[tokio::test]
async fn test_failing_rpc_falls_through_to_local_scan() {
    let index = Arc::new(MockIndex::new(mock_records()).with_failing_search());
    let cascade =
        RetrievalOrchestrator::new(index.clone(), RetrievalConfig::default()).with_index(index);

    let outcome = cascade
        .retrieve("question", Collection::Faq, Some(&[1.0, 0.0, 0.0]))
        .await;
    assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
    assert!(matches!(outcome.failures[0].reason, FailureReason::Error(_)));
}

#[tokio::test]
async fn test_lexical_only_when_local_scan_is_empty() {
    // Embedding points away from every item, so Tier 2 finds nothing.
    let source = Arc::new(MockIndex::new(mock_records()));
    let cascade = RetrievalOrchestrator::new(source, RetrievalConfig::default());

    let outcome = cascade
        .retrieve("question 2", Collection::Faq, Some(&[0.0, -1.0, 0.0]))
        .await;
    assert_eq!(outcome.tier, Some(RetrievalTier::Lexical));
    assert!(outcome.results.iter().all(|r| r.tier == RetrievalTier::Lexical));
    let tiers: Vec<_> = outcome.failures.iter().map(|f| f.tier).collect();
    assert_eq!(tiers, vec![RetrievalTier::LocalScan]);
}

#[tokio::test]
async fn test_lexical_never_runs_after_local_success() {
    let source = Arc::new(MockIndex::new(mock_records()));
    let cascade = RetrievalOrchestrator::new(source, RetrievalConfig::default());

    // Text would match lexically, but the embedding path succeeds first.
    let outcome = cascade
        .retrieve("question answer", Collection::Faq, Some(&[0.0, 0.0, 1.0]))
        .await;
    assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id().as_str(), "item-4");
}

#[tokio::test]
async fn test_remote_timeout_is_bounded() {
    let records = mock_records();
    let slow = Arc::new(
        MockIndex::new(records.clone()).with_mode(MockIndexMode::Slow(Duration::from_secs(5))),
    );
    let source = Arc::new(MockIndex::new(records));
    let config = RetrievalConfig::default().with_remote_timeout(Duration::from_millis(20));
    let cascade = RetrievalOrchestrator::new(source, config).with_index(slow);

    let start = std::time::Instant::now();
    let outcome = cascade
        .retrieve("question", Collection::Faq, Some(&[1.0, 0.0, 0.0]))
        .await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
    assert!(matches!(
        outcome.failures[0].reason,
        FailureReason::Timeout(_)
    ));
}

#[tokio::test]
async fn test_graceful_empty() {
    let store = Arc::new(KnowledgeStore::open_in_memory(3).unwrap());
    let cascade = RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default())
        .with_index(store);

    for collection in Collection::ALL {
        let with_vec = cascade
            .retrieve("ازاي ابدأ؟", collection, Some(&[1.0, 0.0, 0.0]))
            .await;
        let without = cascade.retrieve("", collection, None).await;
        assert!(with_vec.is_empty());
        assert!(with_vec.tier.is_none());
        assert!(without.is_empty());
        assert!(without.top_score().is_none());
    }
}

#[tokio::test]
async fn test_unreachable_source_yields_empty_outcome() {
    let down = Arc::new(MockIndex::new(mock_records()).with_mode(MockIndexMode::Down));
    let cascade =
        RetrievalOrchestrator::new(down.clone(), RetrievalConfig::default()).with_index(down);

    let outcome = cascade
        .retrieve("question", Collection::Faq, Some(&[1.0, 0.0, 0.0]))
        .await;
    assert!(outcome.is_empty());
    assert_eq!(outcome.failures.len(), 3);
    assert!(outcome.failures.iter().all(|f| f.is_outage()));
}

#[tokio::test]
async fn test_ties_break_by_creation_order_across_tiers() {
    let same = vec![0.0, 1.0, 0.0];
    let records = vec![
        record(30, faq("alpha", "x"), Some(same.clone())),
        record(10, faq("beta", "x"), Some(same.clone())),
        record(20, faq("gamma", "x"), Some(same.clone())),
    ];
    let index = Arc::new(MockIndex::new(records));
    let config = RetrievalConfig::default().with_k(2, 2);
    let vector = RetrievalOrchestrator::new(index.clone(), config.clone()).with_index(index.clone());
    let lexical = RetrievalOrchestrator::new(index, config);

    let by_vector = vector.retrieve("", Collection::Faq, Some(&same)).await;
    let by_words = lexical.retrieve("x", Collection::Faq, None).await;

    let order = |o: &carrivo_knowledge::RetrievalOutcome| {
        o.results.iter().map(|r| r.record.position).collect::<Vec<_>>()
    };
    assert_eq!(order(&by_vector), vec![10, 20]);
    assert_eq!(order(&by_words), vec![10, 20]);
}

#[tokio::test]
async fn test_collections_are_isolated_and_k_differs() {
    let store = Arc::new(KnowledgeStore::open_in_memory(3).unwrap());
    for slug in ["frontend", "backend", "devops", "android", "flutter"] {
        store.insert(&roadmap(slug), Some(&[1.0, 0.0, 0.0])).unwrap();
    }
    store.insert(&faq("unrelated", "x"), Some(&[1.0, 0.0, 0.0])).unwrap();

    let cascade = RetrievalOrchestrator::new(store.clone(), RetrievalConfig::default())
        .with_index(store);
    let outcome = cascade
        .retrieve("", Collection::Roadmaps, Some(&[1.0, 0.0, 0.0]))
        .await;

    assert_eq!(outcome.results.len(), 3);
    assert!(
        outcome
            .results
            .iter()
            .all(|r| r.item().collection() == Collection::Roadmaps)
    );
}
