//! PostgREST (Supabase) client for the remote vector index.
//!
//! Similarity search goes through the `match_faqs` / `match_roadmaps` RPCs;
//! raw item fetches read the `faq` and `roadmaps` tables directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{KnowledgeError, Result};
use crate::index::{KnowledgeSource, VectorIndex};
use crate::types::{
    Collection, FaqItem, ItemId, KnowledgeItem, KnowledgeRecord, RoadmapItem, VectorMatch,
};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RemoteIndexConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service or anon key, sent as `apikey` and bearer token.
    pub api_key: String,
    pub timeout: Duration,
}

impl RemoteIndexConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// PostgREST-backed [`VectorIndex`] and [`KnowledgeSource`].
pub struct RemoteIndex {
    client: Client,
    config: RemoteIndexConfig,
}

impl RemoteIndex {
    pub fn new(config: RemoteIndexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KnowledgeError::Unavailable(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn rest_url(&self, path: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn add_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::ACCEPT, "application/json")
    }

    async fn read_rows<T: for<'de> Deserialize<'de>>(response: Response) -> Result<Vec<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(KnowledgeError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn select(&self, collection: Collection, query: &[(&str, String)]) -> Result<Vec<KnowledgeRecord>> {
        let response = self
            .add_headers(self.client.get(self.rest_url(collection.as_str())))
            .query(query)
            .send()
            .await?;

        let rows: Vec<Value> = Self::read_rows(response).await?;
        rows.into_iter()
            .map(|row| record_from_json(collection, row))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for RemoteIndex {
    async fn vector_search(
        &self,
        collection: Collection,
        query: &[f32],
        match_count: usize,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>> {
        let response = self
            .add_headers(
                self.client
                    .post(self.rest_url(&format!("rpc/{}", collection.rpc_name()))),
            )
            .json(&json!({
                "query_embedding": query,
                "match_count": match_count,
                "similarity_threshold": threshold,
            }))
            .send()
            .await?;

        let rows: Vec<RpcMatch> = Self::read_rows(response).await?;
        let mut matches: Vec<VectorMatch> = rows
            .into_iter()
            .map(|row| VectorMatch {
                id: ItemId(id_string(&row.id)),
                similarity: (row.similarity as f32).clamp(-1.0, 1.0),
            })
            .filter(|m| m.similarity > threshold)
            .collect();
        matches.truncate(match_count);

        debug!(
            collection = %collection,
            rpc = collection.rpc_name(),
            results = matches.len(),
            "Remote vector search complete"
        );
        Ok(matches)
    }

    fn name(&self) -> &str {
        "postgrest"
    }
}

#[async_trait]
impl KnowledgeSource for RemoteIndex {
    async fn fetch_active_items(
        &self,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>> {
        self.select(
            collection,
            &[
                ("select", "*".to_string()),
                (collection.active_column(), "eq.true".to_string()),
                ("order", "created_at.asc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn get_items(
        &self,
        collection: Collection,
        ids: &[ItemId],
    ) -> Result<Vec<KnowledgeRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.select(
            collection,
            &[("select", "*".to_string()), ("id", format!("in.({})", list))],
        )
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcMatch {
    id: Value,
    #[serde(default)]
    similarity: f64,
}

#[derive(Debug, Deserialize)]
struct RemoteRoadmap {
    id: Value,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default = "default_true")]
    is_published: bool,
    #[serde(default)]
    embedding: Option<Value>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteFaq {
    id: Value,
    #[serde(default)]
    question_ar: Option<String>,
    #[serde(default)]
    answer_ar: Option<String>,
    #[serde(default)]
    question_ar_eg: Option<String>,
    #[serde(default)]
    answer_ar_eg: Option<String>,
    #[serde(default)]
    question_en: Option<String>,
    #[serde(default)]
    answer_en: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    embedding: Option<Value>,
    #[serde(default)]
    created_at: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Ids may be UUID strings or integers.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// pgvector columns arrive either as a JSON array or as the text form `"[..]"`.
pub fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
        Value::String(text) => {
            let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
            if inner.trim().is_empty() {
                return Some(Vec::new());
            }
            inner
                .split(',')
                .map(|part| part.trim().parse::<f32>().ok())
                .collect()
        }
        _ => None,
    }
}

fn parse_created_at(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn record_from_json(collection: Collection, row: Value) -> Result<KnowledgeRecord> {
    let (id, item, embedding, active, created_at) = match collection {
        Collection::Roadmaps => {
            let r: RemoteRoadmap = serde_json::from_value(row)?;
            let slug = r.slug.unwrap_or_else(|| id_string(&r.id));
            (
                id_string(&r.id),
                KnowledgeItem::Roadmap(RoadmapItem {
                    title: r.title,
                    description: r.description.unwrap_or_default(),
                    url: r.url.unwrap_or_default(),
                    category: r.category.unwrap_or_default(),
                    slug,
                }),
                r.embedding,
                r.is_published,
                r.created_at,
            )
        }
        Collection::Faq => {
            let f: RemoteFaq = serde_json::from_value(row)?;
            (
                id_string(&f.id),
                KnowledgeItem::Faq(FaqItem {
                    question_ar: f.question_ar.unwrap_or_default(),
                    answer_ar: f.answer_ar.unwrap_or_default(),
                    question_ar_eg: f.question_ar_eg,
                    answer_ar_eg: f.answer_ar_eg,
                    question_en: f.question_en.unwrap_or_default(),
                    answer_en: f.answer_en.unwrap_or_default(),
                    category: f.category,
                }),
                f.embedding,
                f.is_active,
                f.created_at,
            )
        }
    };

    let created_at = parse_created_at(created_at.as_deref());
    Ok(KnowledgeRecord {
        id: ItemId(id),
        item,
        embedding: embedding.as_ref().and_then(parse_embedding),
        active,
        // Creation time doubles as the tie-breaking order
        position: created_at.timestamp_micros(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_forms() {
        assert_eq!(
            parse_embedding(&json!([0.5, -1.0, 0.0])),
            Some(vec![0.5, -1.0, 0.0])
        );
        assert_eq!(
            parse_embedding(&json!("[0.5, -1,0]")),
            Some(vec![0.5, -1.0, 0.0])
        );
        assert_eq!(parse_embedding(&json!("[]")), Some(vec![]));
        assert_eq!(parse_embedding(&json!("0.5,1")), None);
        assert_eq!(parse_embedding(&json!(["x"])), None);
        assert_eq!(parse_embedding(&Value::Null), None);
    }

    #[test]
    fn test_faq_row_with_integer_id_and_nulls() {
        let row = json!({
            "id": 7,
            "question_ar": "سؤال",
            "answer_ar": "جواب",
            "question_en": "Question",
            "answer_en": "Answer",
            "category": null,
            "is_active": true,
            "embedding": "[1,0]",
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        });
        let record = record_from_json(Collection::Faq, row).unwrap();
        assert_eq!(record.id.as_str(), "7");
        assert_eq!(record.embedding, Some(vec![1.0, 0.0]));
        assert!(record.active);
        assert!(record.position > 0);
        assert_eq!(record.item.title(), "Question");
    }

    #[test]
    fn test_roadmap_row_without_slug() {
        let row = json!({
            "id": "r-1",
            "title": "Backend",
            "url": "https://roadmap.sh/backend",
            "is_published": true
        });
        let record = record_from_json(Collection::Roadmaps, row).unwrap();
        match record.item {
            KnowledgeItem::Roadmap(r) => {
                assert_eq!(r.slug, "r-1");
                assert_eq!(r.description, "");
            }
            other => panic!("unexpected item {:?}", other),
        }
        assert_eq!(record.embedding, None);
    }

    #[test]
    fn test_rest_url_trims_slash() {
        let index = RemoteIndex::new(RemoteIndexConfig::new("https://x.supabase.co/", "k")).unwrap();
        assert_eq!(
            index.rest_url("rpc/match_faqs"),
            "https://x.supabase.co/rest/v1/rpc/match_faqs"
        );
    }
}
