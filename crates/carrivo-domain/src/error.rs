//! Domain error types.

use thiserror::Error;

use crate::DegradationEvent;

/// Domain-level errors.
///
/// Retrieval-path failures never appear here: they degrade to a weaker tier
/// and are reported as [`DegradationEvent`]s instead.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Empty or oversized message, or an empty session id.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The language model could not produce a reply. The user turn and the
    /// apology have already been written, unless `degradations` reports a
    /// persistence failure.
    #[error("Generation failed: {source}")]
    GenerationFailed {
        /// Localized apology shown to the user.
        apology: String,
        #[source]
        source: carrivo_llm::LlmError,
        /// Non-fatal problems seen before and after the failure.
        degradations: Vec<DegradationEvent>,
    },

    /// Session history error.
    #[error("Session error: {0}")]
    Session(#[from] carrivo_session::SessionError),

    /// Knowledge store error (maintenance operations only).
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] carrivo_knowledge::KnowledgeError),
}

impl DomainError {
    /// The user-facing apology, when this error carries one.
    pub fn apology(&self) -> Option<&str> {
        match self {
            DomainError::GenerationFailed { apology, .. } => Some(apology),
            _ => None,
        }
    }

    /// Degradations recorded before the turn failed.
    pub fn degradations(&self) -> &[DegradationEvent] {
        match self {
            DomainError::GenerationFailed { degradations, .. } => degradations,
            _ => &[],
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
