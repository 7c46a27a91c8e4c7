//! PostgREST client against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use carrivo_knowledge::{
    Collection, ItemId, KnowledgeError, KnowledgeItem, KnowledgeSource, RemoteIndex,
    RemoteIndexConfig, RetrievalConfig, RetrievalOrchestrator, RetrievalTier, VectorIndex,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn index_for(server: &MockServer) -> RemoteIndex {
    RemoteIndex::new(
        RemoteIndexConfig::new(server.uri(), "anon-key").with_timeout(Duration::from_secs(2)),
    )
    .unwrap()
}

fn faq_row(id: &str, question_en: &str, embedding: serde_json::Value, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "question_ar": "كيف أبدأ؟",
        "answer_ar": "ابدأ ببايثون.",
        "question_en": question_en,
        "answer_en": "Start with Python.",
        "category": "programming",
        "is_active": true,
        "embedding": embedding,
        "created_at": created_at
    })
}

#[tokio::test]
async fn test_rpc_search_sends_contract_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_faqs"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .and(body_partial_json(json!({
            "match_count": 5,
            "similarity_threshold": 0.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "a", "question_en": "How do I start?", "similarity": 0.91},
            {"id": "b", "question_en": "Which language?", "similarity": 0.62}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let matches = index_for(&server)
        .vector_search(Collection::Faq, &[0.1, 0.2, 0.3], 5, 0.5)
        .await
        .unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, ItemId::from("a"));
    assert!((matches[0].similarity - 0.91).abs() < 1e-6);
}

#[tokio::test]
async fn test_rpc_results_below_threshold_are_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_roadmaps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "similarity": 0.8},
            {"id": 2, "similarity": 0.5},
            {"id": 3, "similarity": 0.2}
        ])))
        .mount(&server)
        .await;

    let matches = index_for(&server)
        .vector_search(Collection::Roadmaps, &[1.0], 3, 0.5)
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id.as_str(), "1");
}

#[tokio::test]
async fn test_rpc_error_maps_to_remote() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_faqs"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "PGRST202",
            "message": "Could not find the function public.match_faqs"
        })))
        .mount(&server)
        .await;

    let err = index_for(&server)
        .vector_search(Collection::Faq, &[1.0], 5, 0.5)
        .await
        .unwrap_err();
    match err {
        KnowledgeError::Remote { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("match_faqs"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let index = RemoteIndex::new(RemoteIndexConfig::new(uri, "k")).unwrap();
    let err = index
        .vector_search(Collection::Faq, &[1.0], 5, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Unavailable(_)));
}

#[tokio::test]
async fn test_fetch_active_items_filters_and_orders() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/faq"))
        .and(query_param("is_active", "eq.true"))
        .and(query_param("order", "created_at.asc"))
        .and(query_param("limit", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            faq_row("a", "How do I start?", json!("[1,0,0]"), "2024-01-01T00:00:00+00:00"),
            faq_row("b", "Which language?", json!([0.0, 1.0, 0.0]), "2024-02-01T00:00:00+00:00")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let records = index_for(&server)
        .fetch_active_items(Collection::Faq, 200)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].embedding, Some(vec![1.0, 0.0, 0.0]));
    assert_eq!(records[1].embedding, Some(vec![0.0, 1.0, 0.0]));
    assert!(records[0].position < records[1].position);
    assert!(matches!(records[0].item, KnowledgeItem::Faq(_)));
}

#[tokio::test]
async fn test_roadmaps_use_published_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/roadmaps"))
        .and(query_param("is_published", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "r1",
            "title": "Backend Developer",
            "description": "Step by step guide",
            "url": "https://roadmap.sh/backend",
            "category": "Web Development",
            "slug": "backend",
            "is_published": true,
            "created_at": "2024-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let records = index_for(&server)
        .fetch_active_items(Collection::Roadmaps, 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item.title(), "Backend Developer");
}

#[tokio::test]
async fn test_cascade_over_remote_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_faqs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "a", "similarity": 0.97}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/faq"))
        .and(query_param("id", "in.(a)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            faq_row("a", "How do I start?", json!([1.0, 0.0]), "2024-01-01T00:00:00+00:00")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let remote = Arc::new(index_for(&server));
    let cascade =
        RetrievalOrchestrator::new(remote.clone(), RetrievalConfig::default()).with_index(remote);
    let outcome = cascade
        .retrieve("how do I start", Collection::Faq, Some(&[1.0, 0.0]))
        .await;

    assert_eq!(outcome.tier, Some(RetrievalTier::RemoteVector));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id().as_str(), "a");
    assert!((outcome.results[0].score - 0.97).abs() < 1e-6);
}

#[tokio::test]
async fn test_cascade_falls_back_when_rpc_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/match_faqs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/faq"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            faq_row("a", "How do I start?", json!([1.0, 0.0]), "2024-01-01T00:00:00+00:00"),
            faq_row("b", "Which language?", json!([0.0, 1.0]), "2024-01-02T00:00:00+00:00")
        ])))
        .mount(&server)
        .await;

    let remote = Arc::new(index_for(&server));
    let cascade =
        RetrievalOrchestrator::new(remote.clone(), RetrievalConfig::default()).with_index(remote);
    let outcome = cascade
        .retrieve("how do I start", Collection::Faq, Some(&[1.0, 0.0]))
        .await;

    assert_eq!(outcome.tier, Some(RetrievalTier::LocalScan));
    assert_eq!(outcome.results[0].id().as_str(), "a");
    assert!(outcome.failures[0].is_outage());
}
