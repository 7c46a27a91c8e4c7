//! Language-model and embedding clients for Carrivo.
//!
//! Two capabilities live here, both consumed by the retrieval engine through
//! traits so tests can swap in mocks:
//!
//! ```text
//! ┌──────────────────────────┐     ┌────────────────────────────────┐
//! │  LlmBackend              │     │  Embedder                      │
//! │  - complete() → Response │     │  - embed() → Vec<f32>          │
//! └──────────────────────────┘     └────────────────────────────────┘
//!      │             │                   │          │          │
//!      ▼             ▼                   ▼          ▼          ▼
//! ┌─────────┐  ┌──────────┐        ┌────────┐ ┌────────┐ ┌────────┐
//! │ OpenAI/ │  │   Mock   │        │ OpenAI │ │ Local  │ │  Mock  │
//! │  Groq   │  └──────────┘        └────────┘ │ (ONNX) │ └────────┘
//! └─────────┘                                 └────────┘
//!                                        ▲
//!                              EmbeddingPool (bounded workers,
//!                              timeout, backpressure)
//! ```

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod pool;
pub mod types;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend, with_retry};
pub use embeddings::{
    DEFAULT_DIMENSIONS, Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedEmbedder, build_embedder, cosine_similarity, normalize,
};
pub use error::{EmbeddingError, LlmError, RateLimitInfo, Result};
pub use openai::{DEFAULT_GROQ_MODEL, OpenAiBackend, OpenAiConfig};
pub use pool::{EmbeddingPool, PoolConfig};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};

#[cfg(feature = "local-embeddings")]
pub use embeddings::local::LocalEmbedder;
