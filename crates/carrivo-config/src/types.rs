//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]          # chat-completion backend (Groq by default)
//! [embedding]    # embedder + worker pool sizing
//! [retrieval]    # similarity threshold, k, tier timeouts
//! [session]      # history cache and turn database
//! [knowledge]    # SQLite store and optional remote index
//! [chat]         # per-message limits and generation parameters
//! [logging]      # console level and rolling log files
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Application name used for data and config directories.
pub const APP_NAME: &str = "carrivo";

/// Default embedding dimension (paraphrase-multilingual-MiniLM-L12-v2).
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Use the `*_or_default` accessors to
/// read a section with defaults filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrivoConfig {
    /// Chat-completion backend.
    pub llm: Option<LlmConfig>,

    /// Embedding provider and pool sizing.
    pub embedding: Option<EmbeddingConfig>,

    /// Retrieval cascade tuning.
    pub retrieval: Option<RetrievalSection>,

    /// Session history cache and persistence.
    pub session: Option<SessionConfig>,

    /// Knowledge base storage.
    pub knowledge: Option<KnowledgeConfig>,

    /// Per-message limits and generation parameters.
    pub chat: Option<ChatConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl CarrivoConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: CarrivoConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.retrieval.is_some() {
            self.retrieval = other.retrieval;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.knowledge.is_some() {
            self.knowledge = other.knowledge;
        }
        if other.chat.is_some() {
            self.chat = other.chat;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn llm_or_default(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn embedding_or_default(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn retrieval_or_default(&self) -> RetrievalSection {
        self.retrieval.clone().unwrap_or_default()
    }

    pub fn session_or_default(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn knowledge_or_default(&self) -> KnowledgeConfig {
        self.knowledge.clone().unwrap_or_default()
    }

    pub fn chat_or_default(&self) -> ChatConfig {
        self.chat.clone().unwrap_or_default()
    }

    pub fn logging_or_default(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let retrieval = self.retrieval_or_default();
        if !(0.0..=1.0).contains(&retrieval.threshold) {
            return Err(ConfigError::invalid(
                "retrieval.threshold",
                format!("{} is outside [0, 1]", retrieval.threshold),
            ));
        }
        if !(0.0..=1.0).contains(&retrieval.lexical_threshold) {
            return Err(ConfigError::invalid(
                "retrieval.lexical_threshold",
                format!("{} is outside [0, 1]", retrieval.lexical_threshold),
            ));
        }

        let embedding = self.embedding_or_default();
        if embedding.effective_dimensions() == 0 {
            return Err(ConfigError::invalid("embedding.dimensions", "must be positive"));
        }
        if embedding.workers == 0 {
            return Err(ConfigError::invalid("embedding.workers", "must be positive"));
        }

        let chat = self.chat_or_default();
        if chat.max_message_chars == 0 {
            return Err(ConfigError::invalid("chat.max_message_chars", "must be positive"));
        }
        if !(0.0..=1.0).contains(&chat.ungrounded_confidence) {
            return Err(ConfigError::invalid(
                "chat.ungrounded_confidence",
                format!("{} is outside [0, 1]", chat.ungrounded_confidence),
            ));
        }
        Ok(())
    }
}

/// Default per-user data directory (`~/.local/share/carrivo` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".carrivo"))
}

/// Look up a non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the chat-completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider.
    pub backend: Backend,
    /// Model identifier. Defaults per backend.
    pub model: Option<String>,
    /// Custom API base URL (for proxies, custom endpoints).
    pub base_url: Option<String>,
    /// API key (prefer `api_key_env`; warns if set here).
    pub api_key: Option<String>,
    /// Environment variable holding the API key. Defaults per backend.
    pub api_key_env: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retry attempts for retryable failures.
    pub retry_max: u32,
    /// Initial backoff between retries in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Groq,
            model: None,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: 30,
            retry_max: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Environment variable consulted for the API key.
    pub fn api_key_env_var(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.backend.env_var())
    }

    /// Resolve the API key: config file first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env_value(self.api_key_env_var()))
    }

    /// Resolve the API key, failing when the backend needs one.
    pub fn require_api_key(&self) -> Result<Option<String>> {
        match self.resolve_api_key() {
            Some(key) => Ok(Some(key)),
            None if self.backend == Backend::Ollama => Ok(None),
            None => Err(ConfigError::ApiKeyNotFound {
                service: self.backend.display_name().to_string(),
                env_var: self.api_key_env_var().to_string(),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Supported chat-completion providers. All speak the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Groq,
    Openai,
    Ollama,
    Custom,
}

impl Backend {
    /// Default environment variable name for this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Groq => "GROQ_API_KEY",
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Ollama => "OLLAMA_API_KEY",
            Backend::Custom => "LLM_API_KEY",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Groq => "Groq",
            Backend::Openai => "OpenAI",
            Backend::Ollama => "Ollama",
            Backend::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "local"        # "local", "openai", or "mock"
/// dimensions = 384
/// workers = 2
///
/// [embedding.openai]
/// model = "text-embedding-3-small"
/// ```
///
/// One dimension applies to every stored and query vector. Changing it
/// requires `carrivo backfill --force`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "local" (ONNX), "openai", or "mock".
    pub provider: EmbeddingProvider,
    /// Output embedding dimensions.
    pub dimensions: Option<usize>,
    /// Concurrent embedder calls.
    pub workers: usize,
    /// Calls allowed to wait for a worker before new ones are rejected.
    pub queue_depth: usize,
    /// Timeout per embedding call in milliseconds.
    pub timeout_ms: u64,
    /// OpenAI-specific embedding settings.
    pub openai: Option<EmbeddingOpenAiConfig>,
    /// Local ONNX-specific settings.
    pub local: Option<EmbeddingLocalConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            dimensions: None,
            workers: 2,
            queue_depth: 16,
            timeout_ms: 5_000,
            openai: None,
            local: None,
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for every provider.
    pub fn effective_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Provider name as used by the embedder factory.
    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            EmbeddingProvider::Local => "local",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Mock => "mock",
        }
    }

    /// Resolve the OpenAI embedding API key (config, then environment).
    pub fn resolve_openai_api_key(&self) -> Option<String> {
        let openai = self.openai.clone().unwrap_or_default();
        openai.api_key.or_else(|| env_value(&openai.api_key_env))
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX Runtime inference (default, offline-first).
    Local,
    /// OpenAI-compatible embeddings API.
    OpenAi,
    /// Deterministic hash embedder for tests and offline demos.
    Mock,
}

/// OpenAI embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    /// Model name. Default: "text-embedding-3-small".
    pub model: String,
    /// Custom base URL (for proxies).
    pub base_url: Option<String>,
    /// API key (prefer `api_key_env`).
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingOpenAiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Local ONNX embedding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingLocalConfig {
    /// Path to ONNX model file.
    pub model_path: Option<PathBuf>,
    /// Path to tokenizer.json file.
    pub tokenizer_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Retrieval cascade tuning (`[retrieval]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    /// Cosine similarity threshold; results must score strictly above it.
    pub threshold: f32,
    /// Minimum token-overlap score for the lexical tier.
    pub lexical_threshold: f32,
    /// Results returned from the FAQ collection.
    pub k_faq: usize,
    /// Results returned from the roadmap collection.
    pub k_roadmaps: usize,
    /// Maximum items fetched for the local scan.
    pub scan_limit: usize,
    /// Bound on the remote vector search in milliseconds.
    pub remote_timeout_ms: u64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            lexical_threshold: 0.3,
            k_faq: 5,
            k_roadmaps: 3,
            scan_limit: 200,
            remote_timeout_ms: 3_000,
        }
    }
}

impl RetrievalSection {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session history cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum sessions held in memory before LRU eviction.
    pub max_sessions: usize,
    /// Idle seconds before a cached session is dropped (0 disables).
    pub ttl_secs: u64,
    /// Turns kept per session.
    pub history_limit: usize,
    /// SQLite file for persisted turns. Defaults to the data directory.
    pub database: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            ttl_secs: 3_600,
            history_limit: 8,
            database: None,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("conversations.db"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge base storage.
///
/// ```toml
/// [knowledge]
/// database = "/var/lib/carrivo/knowledge.db"
///
/// [knowledge.remote]
/// url = "https://project.supabase.co"
/// api_key_env = "SUPABASE_KEY"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// SQLite file for the local store. Defaults to the data directory.
    pub database: Option<PathBuf>,
    /// JSON seed file loaded by `carrivo seed` instead of the built-in set.
    pub seed_file: Option<PathBuf>,
    /// Remote PostgREST vector index. Absent means local tiers only.
    pub remote: Option<RemoteIndexSection>,
}

impl KnowledgeConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("knowledge.db"))
    }
}

/// Remote PostgREST / Supabase endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteIndexSection {
    /// Project base URL (without `/rest/v1`).
    pub url: String,
    /// API key (prefer `api_key_env`).
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// HTTP client timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteIndexSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            api_key_env: "SUPABASE_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteIndexSection {
    /// Resolve the API key, failing when neither config nor env has one.
    pub fn require_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .or_else(|| env_value(&self.api_key_env))
            .ok_or_else(|| ConfigError::ApiKeyNotFound {
                service: "remote index".to_string(),
                env_var: self.api_key_env.clone(),
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Per-message limits and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
    /// Character budget of the retrieved-context block.
    pub context_char_budget: usize,
    /// Confidence reported when no knowledge item grounded the answer.
    pub ungrounded_confidence: f32,
    /// Rewrite follow-up questions using recent history.
    pub contextualize: bool,
    /// Bound on the rewrite call in milliseconds.
    pub contextualize_timeout_ms: u64,
    /// Bound on answer generation in seconds.
    pub generation_timeout_secs: u64,
    /// Sampling temperature for answers.
    pub temperature: f32,
    /// Token limit for answers.
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 2_000,
            context_char_budget: 4_000,
            ungrounded_confidence: 0.3,
            contextualize: true,
            contextualize_timeout_ms: 4_000,
            generation_timeout_secs: 30,
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

impl ChatConfig {
    pub fn contextualize_timeout(&self) -> Duration {
        Duration::from_millis(self.contextualize_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit console logs as JSON.
    pub json: bool,
    /// Directory for daily rolling JSON log files. Absent disables them.
    pub directory: Option<PathBuf>,
    /// File name prefix for rolling logs.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: APP_NAME.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CarrivoConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());

        let retrieval = config.retrieval_or_default();
        assert_eq!(retrieval.threshold, 0.5);
        assert_eq!(retrieval.k_faq, 5);
        assert_eq!(retrieval.k_roadmaps, 3);
        assert_eq!(config.embedding_or_default().effective_dimensions(), 384);
        assert_eq!(config.session_or_default().history_limit, 8);
        assert_eq!(config.chat_or_default().max_message_chars, 2_000);
        assert_eq!(config.llm_or_default().backend, Backend::Groq);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CarrivoConfig::from_toml(
            r#"
[llm]
backend = "openai"
model = "gpt-4o-mini"
retry_max = 1

[embedding]
provider = "openai"
dimensions = 512

[embedding.openai]
model = "text-embedding-3-large"

[retrieval]
threshold = 0.6
k_faq = 2

[session]
ttl_secs = 0

[knowledge.remote]
url = "https://example.supabase.co"

[chat]
contextualize = false

[logging]
json = true
directory = "/tmp/carrivo-logs"
"#,
        )
        .unwrap();

        let llm = config.llm_or_default();
        assert_eq!(llm.backend, Backend::Openai);
        assert_eq!(llm.retry_max, 1);
        assert_eq!(llm.timeout_secs, 30);

        let embedding = config.embedding_or_default();
        assert_eq!(embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(embedding.effective_dimensions(), 512);
        assert_eq!(embedding.openai.unwrap().model, "text-embedding-3-large");

        let retrieval = config.retrieval_or_default();
        assert_eq!(retrieval.threshold, 0.6);
        assert_eq!(retrieval.k_faq, 2);
        assert_eq!(retrieval.k_roadmaps, 3);

        assert!(config.session_or_default().ttl().is_none());
        let remote = config.knowledge_or_default().remote.unwrap();
        assert_eq!(remote.api_key_env, "SUPABASE_KEY");
        assert!(!config.chat_or_default().contextualize);
        assert!(config.logging_or_default().json);
    }

    #[test]
    fn test_merge_replaces_whole_sections() {
        let mut base = CarrivoConfig::from_toml(
            r#"
[retrieval]
threshold = 0.7

[chat]
max_tokens = 100
"#,
        )
        .unwrap();
        let overlay = CarrivoConfig::from_toml("[retrieval]\nk_faq = 1\n").unwrap();

        base.merge(overlay);

        let retrieval = base.retrieval_or_default();
        assert_eq!(retrieval.k_faq, 1);
        assert_eq!(retrieval.threshold, 0.5);
        assert_eq!(base.chat_or_default().max_tokens, 100);
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = CarrivoConfig::new();
        config.retrieval = Some(RetrievalSection {
            threshold: 0.25,
            ..RetrievalSection::default()
        });
        let text = config.to_toml().unwrap();
        let parsed = CarrivoConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.retrieval_or_default().threshold, 0.25);
        assert!(parsed.llm.is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = CarrivoConfig::from_toml("[retrieval]\nthreshold = 1.5\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "retrieval.threshold"));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let err = CarrivoConfig::from_toml("[llm]\nbackend = \"carrier-pigeon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[serial]
    fn test_llm_api_key_from_custom_env() {
        // SAFETY: serialized with every other env-mutating test.
        unsafe { std::env::set_var("CARRIVO_TEST_LLM_KEY", "env-key") };
        let llm = LlmConfig {
            api_key_env: Some("CARRIVO_TEST_LLM_KEY".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(llm.resolve_api_key().as_deref(), Some("env-key"));
        unsafe { std::env::remove_var("CARRIVO_TEST_LLM_KEY") };
    }

    #[test]
    #[serial]
    fn test_config_api_key_wins_over_env() {
        unsafe { std::env::set_var("GROQ_API_KEY", "from-env") };
        let llm = LlmConfig {
            api_key: Some("from-file".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(llm.resolve_api_key().as_deref(), Some("from-file"));
        unsafe { std::env::remove_var("GROQ_API_KEY") };
    }

    #[test]
    #[serial]
    fn test_missing_api_key_is_error_except_ollama() {
        unsafe { std::env::remove_var("GROQ_API_KEY") };
        let groq = LlmConfig::default();
        assert!(matches!(
            groq.require_api_key(),
            Err(ConfigError::ApiKeyNotFound { ref env_var, .. }) if env_var == "GROQ_API_KEY"
        ));

        let ollama = LlmConfig {
            backend: Backend::Ollama,
            ..LlmConfig::default()
        };
        assert_eq!(ollama.require_api_key().unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_remote_key_resolution() {
        let remote = RemoteIndexSection {
            url: "https://example.supabase.co".to_string(),
            api_key_env: "CARRIVO_TEST_SUPABASE_KEY".to_string(),
            ..RemoteIndexSection::default()
        };
        unsafe { std::env::remove_var("CARRIVO_TEST_SUPABASE_KEY") };
        assert!(remote.require_api_key().is_err());

        unsafe { std::env::set_var("CARRIVO_TEST_SUPABASE_KEY", "anon") };
        assert_eq!(remote.require_api_key().unwrap(), "anon");
        unsafe { std::env::remove_var("CARRIVO_TEST_SUPABASE_KEY") };
    }
}
