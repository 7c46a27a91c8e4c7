//! Chat service: one user message in, one grounded reply out.
//!
//! A turn runs through fixed [`TurnStage`]s while holding the session lock,
//! so turns of one session are applied strictly in arrival order. Failures
//! before generation degrade the reply and are reported as
//! [`DegradationEvent`]s; only a generation failure is fatal, and even then
//! the user turn and a localized apology are persisted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use carrivo_knowledge::{RetrievalOrchestrator, RetrievalOutcome, RetrievalTier};
use carrivo_llm::{CompletionRequest, EmbeddingPool, LlmError, SharedBackend};
use carrivo_session::{SessionGuard, Turn};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assembler::{ContextBlock, ResponseAssembler, SourceRef};
use crate::context::ConversationContextManager;
use crate::error::{DomainError, Result};
use crate::intent::Intent;
use crate::language::{Detection, Language, LanguageHint};
use crate::links::guard_links;
use crate::prompt::{GenerationParams, build_generation_request};
use crate::sanitize::strip_foreign_scripts;

// ─────────────────────────────────────────────────────────────────────────────
// Turn stages
// ─────────────────────────────────────────────────────────────────────────────

/// Stages of one turn, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Received,
    LanguageDetected,
    Contextualized,
    IntentClassified,
    Retrieved,
    Assembled,
    Generated,
    Persisted,
    Responded,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Received => "received",
            TurnStage::LanguageDetected => "language_detected",
            TurnStage::Contextualized => "contextualized",
            TurnStage::IntentClassified => "intent_classified",
            TurnStage::Retrieved => "retrieved",
            TurnStage::Assembled => "assembled",
            TurnStage::Generated => "generated",
            TurnStage::Persisted => "persisted",
            TurnStage::Responded => "responded",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only stage tracker for one turn.
#[derive(Debug)]
pub(crate) struct TurnProgress {
    session_id: String,
    stage: TurnStage,
    started: Instant,
}

impl TurnProgress {
    pub(crate) fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage: TurnStage::Received,
            started: Instant::now(),
        }
    }

    pub(crate) fn stage(&self) -> TurnStage {
        self.stage
    }

    /// Move to `next`. Moving backwards or staying put is ignored.
    pub(crate) fn advance(&mut self, next: TurnStage) {
        if next <= self.stage {
            warn!(
                session_id = %self.session_id,
                current = %self.stage,
                requested = %next,
                "Ignoring out-of-order turn stage"
            );
            return;
        }
        self.stage = next;
        debug!(
            session_id = %self.session_id,
            stage = %next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Turn stage"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response types
// ─────────────────────────────────────────────────────────────────────────────

/// Non-fatal problem during a turn. The reply was still produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradationEvent {
    /// No query embedding; the vector tiers were skipped.
    EmbeddingUnavailable(String),
    /// The remote vector index errored or timed out.
    RemoteIndexUnavailable(String),
    /// Follow-up rewriting failed; the raw message was used.
    ContextualizationFailed(String),
    /// Nothing was retrieved; the reply is ungrounded.
    NoGrounding,
    /// A turn could not be written to storage.
    PersistenceFailed(String),
}

/// Tuning for [`ChatService`].
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Longest accepted message, in characters.
    pub max_message_chars: usize,
    /// Confidence reported for replies without retrieved context.
    pub ungrounded_confidence: f32,
    pub generation_timeout: Duration,
    pub generation: GenerationParams,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_message_chars: 2_000,
            ungrounded_confidence: 0.3,
            generation_timeout: Duration::from_secs(30),
            generation: GenerationParams::default(),
        }
    }
}

/// Reply to one user message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response_text: String,
    pub detected_language: Language,
    pub language_confidence: f32,
    pub response_language: Language,
    /// Whether the reply is in Egyptian Arabic.
    pub is_dialect: bool,
    /// Top retrieval score, or the ungrounded confidence.
    pub confidence: f32,
    pub intent: Intent,
    /// Query used for retrieval.
    pub query: String,
    pub contextualized: bool,
    /// Tier that grounded the reply.
    pub tier: Option<RetrievalTier>,
    pub retrieved_sources: Vec<SourceRef>,
    /// Links replaced because they were not in the context.
    pub removed_links: Vec<String>,
    pub degradations: Vec<DegradationEvent>,
}

impl ChatResponse {
    pub fn is_grounded(&self) -> bool {
        !self.retrieved_sources.is_empty()
    }
}

/// Localized apology for a failed generation.
pub fn apology(language: Language) -> &'static str {
    match language {
        Language::En => "Sorry, something went wrong. Please try again.",
        Language::Ar => "عذراً، حدث خطأ. يرجى المحاولة مرة أخرى.",
        Language::ArEg | Language::Mixed | Language::Unknown => "معلش، حصلت مشكلة. جرب تاني.",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrates context, retrieval, assembly and generation for a turn.
#[derive(Clone)]
pub struct ChatService {
    context: Arc<ConversationContextManager>,
    retrieval: RetrievalOrchestrator,
    embeddings: Option<EmbeddingPool>,
    generator: SharedBackend,
    assembler: ResponseAssembler,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(
        context: Arc<ConversationContextManager>,
        retrieval: RetrievalOrchestrator,
        generator: SharedBackend,
    ) -> Self {
        Self {
            context,
            retrieval,
            embeddings: None,
            generator,
            assembler: ResponseAssembler::default(),
            options: ChatOptions::default(),
        }
    }

    /// Pool for query embeddings. Without one only the lexical tier runs.
    pub fn with_embeddings(mut self, pool: EmbeddingPool) -> Self {
        self.embeddings = Some(pool);
        self
    }

    pub fn with_assembler(mut self, assembler: ResponseAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &Arc<ConversationContextManager> {
        &self.context
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Answer one message in a session.
    pub async fn process_message(
        &self,
        session_id: &str,
        message: &str,
        language_hint: LanguageHint,
    ) -> Result<ChatResponse> {
        let message = self.validate(message)?;
        let mut session = self.context.open_session(session_id).await?;
        let mut progress = TurnProgress::new(session_id);
        let mut degradations = Vec::new();

        debug!(session_id = %session_id, chars = message.chars().count(), "Processing message");

        let detection = self.context.detect_language(message);
        let response_language = self.context.response_language(language_hint, &detection, &session);
        progress.advance(TurnStage::LanguageDetected);

        let recent = session.recent(self.context.config().history_turns);
        let rewrite = self.context.contextualize(message, &recent).await;
        if let Some(reason) = &rewrite.failure {
            degradations.push(DegradationEvent::ContextualizationFailed(reason.clone()));
        }
        progress.advance(TurnStage::Contextualized);

        let intent = self.context.classify_intent(&rewrite.query);
        progress.advance(TurnStage::IntentClassified);

        let embedding = self
            .embed_query(&rewrite.query, detection.language, &mut degradations)
            .await;
        let outcome = self
            .retrieval
            .retrieve(&rewrite.query, intent.collection(), embedding.as_deref())
            .await;
        record_outages(&outcome, &mut degradations);
        progress.advance(TurnStage::Retrieved);

        let block = self.assembler.assemble(&outcome.results, response_language);
        if block.is_none() {
            degradations.push(DegradationEvent::NoGrounding);
        }
        progress.advance(TurnStage::Assembled);

        let request = build_generation_request(
            message,
            block.as_ref(),
            &recent,
            response_language,
            &self.options.generation,
        );
        let raw_reply = match self.generate(request).await {
            Ok(text) => text,
            Err(source) => {
                return Err(self
                    .fail_turn(
                        &mut session,
                        message,
                        &detection,
                        response_language,
                        source,
                        degradations,
                    )
                    .await);
            }
        };
        progress.advance(TurnStage::Generated);

        let allowed = block.as_ref().map(|b| b.urls.as_slice()).unwrap_or(&[]);
        let guarded = guard_links(&raw_reply, allowed);
        let (response_text, dropped) = strip_foreign_scripts(&guarded.text);
        if dropped > 0 {
            debug!(session_id = %session_id, dropped, "Removed foreign-script characters from reply");
        }

        self.persist(
            &mut session,
            user_turn(message, &detection),
            &mut degradations,
        )
        .await;
        self.persist(
            &mut session,
            Turn::assistant(response_text.clone(), response_language.code())
                .with_dialect(response_language.is_dialect()),
            &mut degradations,
        )
        .await;
        progress.advance(TurnStage::Persisted);

        let response = ChatResponse {
            session_id: session_id.to_string(),
            response_text,
            detected_language: detection.language,
            language_confidence: detection.confidence,
            response_language,
            is_dialect: response_language.is_dialect(),
            confidence: self.confidence(block.as_ref(), &outcome),
            intent,
            query: rewrite.query,
            contextualized: rewrite.contextualized,
            tier: block.as_ref().and(outcome.tier),
            retrieved_sources: block.map(|b| b.sources).unwrap_or_default(),
            removed_links: guarded.removed,
            degradations,
        };
        progress.advance(TurnStage::Responded);

        info!(
            session_id = %session_id,
            language = %response.response_language,
            intent = %response.intent,
            tier = response.tier.map(|t| t.as_str()),
            sources = response.retrieved_sources.len(),
            degradations = response.degradations.len(),
            "Message answered"
        );
        Ok(response)
    }

    fn validate<'a>(&self, message: &'a str) -> Result<&'a str> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DomainError::InvalidInput("message must not be empty".to_string()));
        }
        let chars = message.chars().count();
        if chars > self.options.max_message_chars {
            return Err(DomainError::InvalidInput(format!(
                "message has {} characters, the limit is {}",
                chars, self.options.max_message_chars
            )));
        }
        Ok(message)
    }

    async fn embed_query(
        &self,
        query: &str,
        language: Language,
        degradations: &mut Vec<DegradationEvent>,
    ) -> Option<Vec<f32>> {
        let Some(pool) = &self.embeddings else {
            degradations.push(DegradationEvent::EmbeddingUnavailable(
                "no embedding pool configured".to_string(),
            ));
            return None;
        };
        match pool.embed(query, Some(language.code())).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(error = %e, "Query embedding unavailable, vector tiers skipped");
                degradations.push(DegradationEvent::EmbeddingUnavailable(e.to_string()));
                None
            }
        }
    }

    async fn generate(&self, request: CompletionRequest) -> std::result::Result<String, LlmError> {
        let timeout = self.options.generation_timeout;
        let response = tokio::time::timeout(timeout, self.generator.complete(request))
            .await
            .map_err(|_| LlmError::Network(format!("generation timed out after {:?}", timeout)))??;

        let text = response.text();
        if text.is_empty() {
            return Err(LlmError::Backend("empty completion".to_string()));
        }
        Ok(text.to_string())
    }

    /// Persist the user turn and an apology, then build the error.
    async fn fail_turn(
        &self,
        session: &mut SessionGuard,
        message: &str,
        detection: &Detection,
        language: Language,
        source: LlmError,
        mut degradations: Vec<DegradationEvent>,
    ) -> DomainError {
        warn!(
            session_id = %session.history().session_id(),
            backend = self.generator.name(),
            error = %source,
            "Generation failed, replying with apology"
        );

        let apology = apology(language).to_string();
        self.persist(session, user_turn(message, detection), &mut degradations)
            .await;
        self.persist(
            session,
            Turn::assistant(apology.clone(), language.code()).with_dialect(language.is_dialect()),
            &mut degradations,
        )
        .await;

        DomainError::GenerationFailed {
            apology,
            source,
            degradations,
        }
    }

    async fn persist(
        &self,
        session: &mut SessionGuard,
        turn: Turn,
        degradations: &mut Vec<DegradationEvent>,
    ) {
        let role = turn.role;
        if let Err(e) = session.append(turn).await {
            warn!(
                session_id = %session.history().session_id(),
                role = %role,
                error = %e,
                "Failed to persist turn; kept in memory"
            );
            degradations.push(DegradationEvent::PersistenceFailed(e.to_string()));
        }
    }

    fn confidence(&self, block: Option<&ContextBlock>, outcome: &RetrievalOutcome) -> f32 {
        match (block, outcome.top_score()) {
            (Some(_), Some(score)) => score.clamp(0.0, 1.0),
            _ => self.options.ungrounded_confidence,
        }
    }
}

fn user_turn(message: &str, detection: &Detection) -> Turn {
    Turn::user(message, detection.language.code()).with_dialect(detection.is_dialect)
}

fn record_outages(outcome: &RetrievalOutcome, degradations: &mut Vec<DegradationEvent>) {
    for failure in &outcome.failures {
        if failure.tier == RetrievalTier::RemoteVector && failure.is_outage() {
            degradations.push(DegradationEvent::RemoteIndexUnavailable(
                failure.reason.to_string(),
            ));
        }
    }
}
