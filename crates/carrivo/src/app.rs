//! Builds the engine from resolved configuration.
//!
//! Every command goes through here, so config-to-component mapping lives in
//! one place. Pieces are built lazily: `search` never needs an LLM key, and
//! `config` never opens a database.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{info, warn};

use carrivo_config::{Backend, CarrivoConfig, LlmConfig};
use carrivo_domain::{
    ChatOptions, ContextConfig, ConversationContextManager, DomainServices, GenerationParams,
    ResponseAssembler,
};
use carrivo_knowledge::{
    KnowledgeStore, RemoteIndex, RemoteIndexConfig, RetrievalConfig, RetrievalOrchestrator,
};
use carrivo_llm::{
    EmbedderSpec, EmbeddingPool, OpenAiBackend, OpenAiConfig, PoolConfig, SharedBackend,
    build_embedder,
};
use carrivo_session::{HistoryConfig, HistoryStore, SqliteTurnStore};

const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Open the local knowledge store at the configured dimension.
pub fn open_store(config: &CarrivoConfig) -> Result<Arc<KnowledgeStore>> {
    let path = config.knowledge_or_default().database_path();
    ensure_parent(&path)?;
    let dims = config.embedding_or_default().effective_dimensions();
    let store = KnowledgeStore::open(&path, dims)
        .with_context(|| format!("Failed to open knowledge store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Conversation history backed by the SQLite turn log.
pub fn open_history(config: &CarrivoConfig) -> Result<HistoryStore> {
    let session = config.session_or_default();
    let path = session.database_path();
    ensure_parent(&path)?;
    let turns = SqliteTurnStore::open(&path)
        .with_context(|| format!("Failed to open conversation log at {}", path.display()))?;

    let mut history_config = HistoryConfig::new()
        .with_max_sessions(session.max_sessions)
        .with_history_limit(session.history_limit);
    history_config = match session.ttl() {
        Some(ttl) => history_config.with_ttl(ttl),
        None => history_config.without_ttl(),
    };

    Ok(HistoryStore::new(history_config, Arc::new(turns)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

fn embedder_spec(config: &CarrivoConfig) -> EmbedderSpec {
    let embedding = config.embedding_or_default();
    let openai = embedding.openai.clone().unwrap_or_default();
    let local = embedding.local.clone().unwrap_or_default();

    EmbedderSpec {
        provider: embedding.provider_name().to_string(),
        openai_api_key: embedding.resolve_openai_api_key(),
        openai_model: Some(openai.model),
        openai_base_url: openai.base_url,
        local_model_path: local.model_path,
        local_tokenizer_path: local.tokenizer_path,
        dimensions: embedding.effective_dimensions(),
    }
}

/// The shared embedding pool. Fails when the provider cannot be built.
pub fn build_embeddings(config: &CarrivoConfig) -> Result<EmbeddingPool> {
    let embedding = config.embedding_or_default();
    let embedder = build_embedder(&embedder_spec(config))
        .context("Failed to initialize the embedding provider")?;

    let pool_config = PoolConfig::default()
        .with_workers(embedding.workers)
        .with_queue_depth(embedding.queue_depth)
        .with_timeout(embedding.timeout());

    info!(
        provider = embedding.provider_name(),
        dimensions = embedding.effective_dimensions(),
        workers = embedding.workers,
        "Embedding pool ready"
    );
    Ok(EmbeddingPool::new(embedder, pool_config))
}

/// Like [`build_embeddings`], but a broken provider only disables the vector
/// tiers.
pub fn try_build_embeddings(config: &CarrivoConfig) -> Option<EmbeddingPool> {
    match build_embeddings(config) {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Embeddings unavailable, using lexical retrieval only");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────────────

/// Cascade over the remote project when one is configured, otherwise over
/// the local store and its vec0 index. Tier 1 ids must resolve through the
/// same source, so the two are never mixed.
pub fn build_retrieval(
    config: &CarrivoConfig,
    store: Arc<KnowledgeStore>,
) -> Result<RetrievalOrchestrator> {
    let section = config.retrieval_or_default();
    let retrieval_config = RetrievalConfig::default()
        .with_threshold(section.threshold)
        .with_lexical_threshold(section.lexical_threshold)
        .with_k(section.k_faq, section.k_roadmaps)
        .with_scan_limit(section.scan_limit)
        .with_remote_timeout(section.remote_timeout());

    let remote = config
        .knowledge_or_default()
        .remote
        .filter(|r| !r.url.trim().is_empty());
    match remote {
        Some(remote) => {
            let api_key = remote.require_api_key()?;
            let index = RemoteIndex::new(
                RemoteIndexConfig::new(&remote.url, api_key).with_timeout(remote.timeout()),
            )
            .context("Failed to create remote index client")?;
            let index = Arc::new(index);
            info!(url = %remote.url, "Using remote knowledge index");
            Ok(RetrievalOrchestrator::new(index.clone(), retrieval_config).with_index(index))
        }
        None => Ok(RetrievalOrchestrator::new(store.clone(), retrieval_config).with_index(store)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Language model
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completion backend for the configured provider.
pub fn create_backend(llm: &LlmConfig) -> Result<SharedBackend> {
    let api_key = llm.require_api_key()?;

    let mut backend_config = match llm.backend {
        Backend::Groq => OpenAiConfig::groq(api_key.unwrap_or_default()),
        Backend::Openai => OpenAiConfig::openai(api_key.unwrap_or_default()),
        Backend::Ollama => {
            let mut ollama = OpenAiConfig::ollama(llm.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL));
            ollama.api_key = api_key;
            ollama
        }
        Backend::Custom => {
            let base_url = llm.base_url.clone().ok_or_else(|| {
                anyhow::anyhow!("llm.base_url is required for the custom backend")
            })?;
            let mut custom = OpenAiConfig::openai(api_key.unwrap_or_default()).with_base_url(base_url);
            custom.name = "custom".to_string();
            custom
        }
    };

    if let Some(ref model) = llm.model {
        backend_config = backend_config.with_model(model);
    }
    if let Some(ref base_url) = llm.base_url {
        backend_config = backend_config.with_base_url(base_url);
    }
    backend_config = backend_config
        .with_timeout(llm.timeout())
        .with_retries(llm.retry_max, llm.retry_backoff());

    info!(backend = %llm.backend, model = %backend_config.model, "LLM backend ready");
    Ok(Arc::new(OpenAiBackend::new(backend_config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat engine
// ─────────────────────────────────────────────────────────────────────────────

/// Wire the full chat engine.
pub fn build_services(config: &CarrivoConfig) -> Result<DomainServices> {
    let store = open_store(config)?;
    let retrieval = build_retrieval(config, store)?;
    let embeddings = try_build_embeddings(config);
    let backend = create_backend(&config.llm_or_default())?;
    let chat = config.chat_or_default();

    let context_config = ContextConfig {
        contextualize: chat.contextualize,
        timeout: chat.contextualize_timeout(),
        ..ContextConfig::default()
    };
    let context = ConversationContextManager::new(open_history(config)?)
        .with_contextualizer(backend.clone())
        .with_config(context_config);

    let options = ChatOptions {
        max_message_chars: chat.max_message_chars,
        ungrounded_confidence: chat.ungrounded_confidence,
        generation_timeout: chat.generation_timeout(),
        generation: GenerationParams {
            temperature: chat.temperature,
            max_tokens: chat.max_tokens,
            ..GenerationParams::default()
        },
    };

    Ok(DomainServices::new(
        Arc::new(context),
        retrieval,
        embeddings,
        backend,
        ResponseAssembler::new().with_char_budget(chat.context_char_budget),
        options,
    ))
}
