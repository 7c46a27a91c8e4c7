//! Conversation context: per-session history, language, follow-up rewriting
//! and intent.
//!
//! [`ConversationContextManager`] owns the session store and the pluggable
//! classifiers. It does not retrieve or generate; the chat service drives it
//! stage by stage while holding the session lock.

use std::sync::Arc;
use std::time::Duration;

use carrivo_llm::SharedBackend;
use carrivo_session::{HistoryStore, SessionError, SessionGuard, Turn};
use tracing::{debug, warn};

use crate::error::{DomainError, Result};
use crate::intent::{Intent, KeywordIntentClassifier, SharedIntentClassifier};
use crate::language::{
    Detection, HeuristicDetector, Language, LanguageHint, SharedLanguageDetector,
    resolve_response_language,
};
use crate::prompt::{PROMPT_HISTORY_TURNS, build_contextualize_request};

/// Tuning for the context manager.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Turns of history used for rewriting and prompting.
    pub history_turns: usize,
    /// Rewrite follow-ups into standalone queries.
    pub contextualize: bool,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Empty means the backend's configured model.
    pub model: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_turns: PROMPT_HISTORY_TURNS,
            contextualize: true,
            timeout: Duration::from_secs(4),
            max_tokens: 60,
            temperature: 0.3,
            model: String::new(),
        }
    }
}

/// The query used for retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Contextualization {
    pub query: String,
    /// Whether `query` differs from the raw message.
    pub contextualized: bool,
    /// Why rewriting failed, when it was attempted and fell back.
    pub failure: Option<String>,
}

impl Contextualization {
    fn raw(message: &str) -> Self {
        Self {
            query: message.to_string(),
            contextualized: false,
            failure: None,
        }
    }

    fn fallback(message: &str, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::raw(message)
        }
    }
}

/// Per-session conversation state and message classification.
pub struct ConversationContextManager {
    history: HistoryStore,
    detector: SharedLanguageDetector,
    classifier: SharedIntentClassifier,
    contextualizer: Option<SharedBackend>,
    config: ContextConfig,
}

impl ConversationContextManager {
    /// Manager with the heuristic detector, keyword intents and no
    /// contextualizer.
    pub fn new(history: HistoryStore) -> Self {
        Self {
            history,
            detector: Arc::new(HeuristicDetector::new()),
            classifier: Arc::new(KeywordIntentClassifier::new()),
            contextualizer: None,
            config: ContextConfig::default(),
        }
    }

    pub fn with_detector(mut self, detector: SharedLanguageDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_classifier(mut self, classifier: SharedIntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Backend used to rewrite follow-ups.
    pub fn with_contextualizer(mut self, backend: SharedBackend) -> Self {
        self.contextualizer = Some(backend);
        self
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Lock a session for one turn.
    pub async fn open_session(&self, session_id: &str) -> Result<SessionGuard> {
        self.history.lock(session_id).await.map_err(|e| match e {
            SessionError::InvalidSessionId(_) => {
                DomainError::InvalidInput("session id must not be empty".to_string())
            }
            other => DomainError::Session(other),
        })
    }

    pub fn detect_language(&self, message: &str) -> Detection {
        self.detector.detect(message)
    }

    /// Reply language for this turn, using the session's first language as
    /// a fallback.
    pub fn response_language(
        &self,
        hint: LanguageHint,
        detection: &Detection,
        session: &SessionGuard,
    ) -> Language {
        let session_default = session
            .history()
            .default_language()
            .and_then(|code| code.parse::<Language>().ok());
        resolve_response_language(hint, detection.language, session_default)
    }

    pub fn classify_intent(&self, query: &str) -> Intent {
        self.classifier.classify(query)
    }

    /// Rewrite a follow-up into a standalone query.
    ///
    /// Without history, backend or with rewriting disabled the raw message
    /// is used as is. Errors, timeouts and empty output fall back to the raw
    /// message and report why.
    pub async fn contextualize(&self, message: &str, recent: &[Turn]) -> Contextualization {
        if recent.is_empty() || !self.config.contextualize {
            return Contextualization::raw(message);
        }
        let Some(backend) = &self.contextualizer else {
            return Contextualization::raw(message);
        };

        let request = build_contextualize_request(
            message,
            recent,
            &self.config.model,
            self.config.max_tokens,
            self.config.temperature,
        );

        let reply = match tokio::time::timeout(self.config.timeout, backend.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "Contextualization failed, using raw query");
                return Contextualization::fallback(message, e.to_string());
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Contextualization timed out, using raw query"
                );
                return Contextualization::fallback(
                    message,
                    format!("timed out after {:?}", self.config.timeout),
                );
            }
        };

        let query = clean_rewrite(reply.text());
        if query.is_empty() {
            warn!("Contextualization returned nothing, using raw query");
            return Contextualization::fallback(message, "empty rewrite");
        }

        let contextualized = query != message.trim();
        debug!(original = %message, query = %query, contextualized, "Query contextualized");
        Contextualization {
            query,
            contextualized,
            failure: None,
        }
    }
}

const QUOTES: &[char] = &['"', '\'', '«', '»', '“', '”', '`'];

/// First line of the model output, without labels or quotes.
fn clean_rewrite(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = match line.split_once(':') {
        Some((label, rest)) if label.trim().eq_ignore_ascii_case("standalone query") => rest,
        _ => line,
    };
    line.trim().trim_matches(QUOTES).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrivo_llm::{MockBackend, MockResponse};
    use carrivo_session::{HistoryConfig, InMemoryTurnStore};

    fn manager() -> ConversationContextManager {
        let store = HistoryStore::new(HistoryConfig::default(), Arc::new(InMemoryTurnStore::new()));
        ConversationContextManager::new(store)
    }

    fn recent() -> Vec<Turn> {
        vec![
            Turn::user("what is the backend roadmap?", "en"),
            Turn::assistant("Start with one language, then databases.", "en"),
        ]
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("  \"backend databases\"  "), "backend databases");
        assert_eq!(clean_rewrite("Standalone query: «مسار الباك اند»"), "مسار الباك اند");
        assert_eq!(clean_rewrite("\n\nfirst line\nsecond"), "first line");
        assert_eq!(clean_rewrite("   "), "");
    }

    #[tokio::test]
    async fn test_no_history_uses_raw_query() {
        let backend = Arc::new(MockBackend::with_text("rewritten"));
        let manager = manager().with_contextualizer(backend.clone());

        let result = manager.contextualize("how long does it take?", &[]).await;
        assert_eq!(result.query, "how long does it take?");
        assert!(!result.contextualized);
        assert!(result.failure.is_none());
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_is_rewritten() {
        let backend = Arc::new(MockBackend::with_text("\"how long does the backend roadmap take\""));
        let manager = manager().with_contextualizer(backend.clone());

        let result = manager.contextualize("how long does it take?", &recent()).await;
        assert_eq!(result.query, "how long does the backend roadmap take");
        assert!(result.contextualized);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_falls_back_to_raw_query() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Error("down".into())]));
        let manager = manager().with_contextualizer(backend);

        let result = manager.contextualize("and after that?", &recent()).await;
        assert_eq!(result.query, "and after that?");
        assert!(!result.contextualized);
        assert!(result.failure.unwrap().contains("down"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_raw_query() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Delayed(
            Duration::from_millis(500),
            "too late".into(),
        )]));
        let manager = manager()
            .with_contextualizer(backend)
            .with_config(ContextConfig {
                timeout: Duration::from_millis(20),
                ..ContextConfig::default()
            });

        let result = manager.contextualize("and after that?", &recent()).await;
        assert_eq!(result.query, "and after that?");
        assert!(result.failure.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_rewrite_falls_back() {
        let backend = Arc::new(MockBackend::with_text("  \"\" "));
        let manager = manager().with_contextualizer(backend);

        let result = manager.contextualize("and then?", &recent()).await;
        assert_eq!(result.query, "and then?");
        assert_eq!(result.failure.as_deref(), Some("empty rewrite"));
    }

    #[tokio::test]
    async fn test_empty_session_id_is_invalid_input() {
        let result = manager().open_session("   ").await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_response_language_uses_session_default() {
        let manager = manager();
        let mut session = manager.open_session("s1").await.unwrap();
        session.append(Turn::user("ازيك عامل ايه", "ar_EG")).await.unwrap();

        // Digits only: detection is unknown, the session default applies.
        let detection = manager.detect_language("123");
        let language = manager.response_language(LanguageHint::Auto, &detection, &session);
        assert_eq!(language, Language::ArEg);

        let explicit = LanguageHint::Explicit(Language::En);
        assert_eq!(
            manager.response_language(explicit, &detection, &session),
            Language::En
        );
    }
}
