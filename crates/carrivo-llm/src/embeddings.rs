//! Text embeddings for semantic retrieval.
//!
//! This module provides the [`Embedder`] trait and implementations for
//! generating vector embeddings from text. Callers should not invoke an
//! embedder directly on a request path; wrap it in an
//! [`EmbeddingPool`](crate::pool::EmbeddingPool) instead.
//!
//! # Implementations
//!
//! - [`MockEmbedder`]: Returns deterministic embeddings for testing
//! - [`LocalEmbedder`](local::LocalEmbedder): ONNX Runtime inference (requires `local-embeddings` feature)
//! - [`OpenAiEmbedder`]: Any OpenAI-compatible `/embeddings` endpoint

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};

/// Width of `paraphrase-multilingual-MiniLM-L12-v2`, the default model.
pub const DEFAULT_DIMENSIONS: usize = 384;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
///
/// Implementations must be deterministic for a fixed model and input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Get the name of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across tasks.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder for testing and offline runs.
///
/// Generates deterministic unit vectors seeded from a hash of the text. Equal
/// texts map to equal vectors; unrelated texts are close to orthogonal.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut state = simple_hash(text);
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as u16 as f32 / 32768.0) - 1.0
            })
            .collect();

        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// djb2 over the bytes of `s`.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for OpenAI-compatible embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model to use for embeddings.
    pub model: String,
    /// Requested output width, sent as `dimensions` when set.
    pub dimensions: Option<usize>,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request a specific output width.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// OpenAI-compatible embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config.dimensions.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Internal("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(format!("Failed to parse response: {}", e)))?;

        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Embedder (ONNX Runtime)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "local-embeddings")]
pub mod local {
    //! Local embeddings using ONNX Runtime.
    //!
    //! Inference runs on tokio's blocking pool so it never stalls an async
    //! worker thread.

    use super::*;
    use ndarray::Array2;
    use ort::session::Session;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use std::path::Path;
    use tokenizers::Tokenizer;

    /// Largest batch handed to a single `session.run()`.
    const CHUNK_SIZE: usize = 32;

    struct Inner {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
    }

    /// Local embedder for a sentence-transformers ONNX export
    /// (mean pooling over the last hidden state, L2-normalized).
    pub struct LocalEmbedder {
        inner: Arc<Inner>,
        dimensions: usize,
    }

    fn internal(context: &str, e: impl std::fmt::Display) -> LlmError {
        LlmError::Internal(format!("{}: {}", context, e))
    }

    impl LocalEmbedder {
        /// Load a local embedder from an ONNX model and its `tokenizer.json`.
        pub fn load(
            model_path: impl AsRef<Path>,
            tokenizer_path: impl AsRef<Path>,
            dimensions: usize,
        ) -> Result<Self> {
            let session = Session::builder()
                .map_err(|e| internal("Failed to create ONNX session", e))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| internal("Failed to set optimization level", e))?
                .commit_from_file(model_path.as_ref())
                .map_err(|e| {
                    internal(
                        &format!("Failed to load ONNX model from {:?}", model_path.as_ref()),
                        e,
                    )
                })?;

            let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
                internal(
                    &format!("Failed to load tokenizer from {:?}", tokenizer_path.as_ref()),
                    e,
                )
            })?;

            Ok(Self {
                inner: Arc::new(Inner {
                    session: Mutex::new(session),
                    tokenizer,
                }),
                dimensions,
            })
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let results = self.embed_batch(&[text]).await?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::Internal("No embedding returned".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let inner = Arc::clone(&self.inner);
            let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

            tokio::task::spawn_blocking(move || inner.embed_all(&owned))
                .await
                .map_err(|e| internal("Embedding task failed", e))?
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "local"
        }
    }

    impl Inner {
        fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let encodings = texts
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(text.as_str(), true)
                        .map_err(|e| internal("Tokenization failed", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut all = Vec::with_capacity(texts.len());
            for chunk in encodings.chunks(CHUNK_SIZE) {
                all.extend(self.run_batch(chunk)?);
            }
            Ok(all)
        }

        /// Pad a batch to a common length, run it, and mean-pool each row.
        fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
            let batch_size = encodings.len();
            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0);

            let mut input_ids = vec![0i64; batch_size * max_len];
            let mut attention_mask = vec![0i64; batch_size * max_len];
            let mut token_type_ids = vec![0i64; batch_size * max_len];

            for (i, enc) in encodings.iter().enumerate() {
                let offset = i * max_len;
                for (j, ((id, mask), ty)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    input_ids[offset + j] = *id as i64;
                    attention_mask[offset + j] = *mask as i64;
                    token_type_ids[offset + j] = *ty as i64;
                }
            }

            let shape = (batch_size, max_len);
            let to_tensor = |flat: Vec<i64>| -> Result<Tensor<i64>> {
                let array =
                    Array2::from_shape_vec(shape, flat).map_err(|e| internal("Array error", e))?;
                Tensor::from_array(array).map_err(|e| internal("Tensor error", e))
            };
            let ids_tensor = to_tensor(input_ids)?;
            let mask_tensor = to_tensor(attention_mask.clone())?;
            let types_tensor = to_tensor(token_type_ids)?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => types_tensor,
                ])
                .map_err(|e| internal("ONNX inference failed", e))?;

            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| internal("Output extraction failed", e))?;

            // (batch, seq, hidden)
            let seq_len = out_shape[1] as usize;
            let hidden = out_shape[2] as usize;

            let mut results = Vec::with_capacity(batch_size);
            for i in 0..batch_size {
                let mut sum = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for j in 0..seq_len.min(max_len) {
                    if attention_mask[i * max_len + j] == 0 {
                        continue;
                    }
                    let row = &data[(i * seq_len + j) * hidden..(i * seq_len + j + 1) * hidden];
                    for (acc, v) in sum.iter_mut().zip(row) {
                        *acc += v;
                    }
                    count += 1.0;
                }
                if count > 0.0 {
                    for v in &mut sum {
                        *v /= count;
                    }
                }
                normalize(&mut sum);
                results.push(sum);
            }

            Ok(results)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of the embedder to build.
///
/// Populated by the binary from `EmbeddingConfig`, which keeps this crate
/// free of a config dependency.
#[derive(Debug, Clone)]
pub struct EmbedderSpec {
    /// Provider name: "local", "openai", or "mock".
    pub provider: String,
    /// OpenAI API key (required for "openai" provider).
    pub openai_api_key: Option<String>,
    /// OpenAI model name.
    pub openai_model: Option<String>,
    /// OpenAI base URL override.
    pub openai_base_url: Option<String>,
    /// Local ONNX model path.
    pub local_model_path: Option<std::path::PathBuf>,
    /// Local tokenizer.json path.
    pub local_tokenizer_path: Option<std::path::PathBuf>,
    /// Configured dimension; every provider must produce exactly this width.
    pub dimensions: usize,
}

/// Build a `SharedEmbedder` from a spec.
///
/// "local" without the `local-embeddings` feature, or without model files on
/// disk, falls back to `MockEmbedder` with a warning.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    let dims = spec.dimensions;
    match spec.provider.as_str() {
        "openai" => {
            let api_key = spec.openai_api_key.as_deref().ok_or_else(|| {
                LlmError::Config(
                    "OpenAI embedding provider requires an API key. \
                     Set OPENAI_API_KEY or configure [embedding] api_key_env."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key).with_dimensions(dims);
            if let Some(ref model) = spec.openai_model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.openai_base_url {
                config = config.with_base_url(base_url);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => {
            let paths = match (&spec.local_model_path, &spec.local_tokenizer_path) {
                (Some(model), Some(tokenizer)) => Some((model.clone(), tokenizer.clone())),
                _ => default_local_model_dir()
                    .map(|dir| (dir.join("model.onnx"), dir.join("tokenizer.json")))
                    .filter(|(model, tokenizer)| model.exists() && tokenizer.exists()),
            };
            match paths {
                Some((model, tokenizer)) => {
                    Ok(Arc::new(local::LocalEmbedder::load(model, tokenizer, dims)?))
                }
                None => {
                    tracing::warn!(
                        "Local embedding model not found. Falling back to mock embedder. \
                         Export paraphrase-multilingual-MiniLM-L12-v2 to ONNX under \
                         ~/.local/share/carrivo/models/embeddings/"
                    );
                    Ok(Arc::new(MockEmbedder::new(dims)))
                }
            }
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => {
            tracing::warn!(
                "Local embeddings requested but 'local-embeddings' feature is not enabled. \
                 Falling back to mock embedder."
            );
            Ok(Arc::new(MockEmbedder::new(dims)))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(dims))),
        other => Err(LlmError::Config(format!(
            "Unknown embedding provider '{}'. Valid: local, openai, mock",
            other
        ))),
    }
}

/// Default directory for local embedding model files.
pub fn default_local_model_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|d| d.join("carrivo").join("models").join("embeddings"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two embeddings, clamped to `[-1, 1]`.
///
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
