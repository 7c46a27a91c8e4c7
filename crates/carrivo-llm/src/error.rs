//! Error types for the LLM crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider specified).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Create a new rate limit info with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Parse rate limit info from a Groq error message.
    ///
    /// Groq returns messages like:
    /// "Rate limit reached... Please try again in 6.57792s."
    pub fn parse_groq(message: &str) -> Self {
        Self {
            message: message.to_string(),
            retry_after: parse_groq_retry_after(message),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse Groq's "Please try again in Xs" format.
fn parse_groq_retry_after(message: &str) -> Option<Duration> {
    let patterns = ["try again in ", "Try again in ", "retry in "];

    for pattern in patterns {
        if let Some(idx) = message.find(pattern) {
            let rest = &message[idx + pattern.len()..];
            let num_str: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();

            if let Ok(seconds) = num_str.parse::<f64>() {
                return Some(Duration::from_secs_f64(seconds));
            }
        }
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for LLM and embedding provider calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Create a rate limit error from a message string.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why an embedding could not be produced.
///
/// Every variant is a capability outage for the caller: retrieval degrades to
/// lexical matching instead of failing the request.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Input text was empty after trimming.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// The worker pool queue is full.
    #[error("embedding pool saturated ({in_flight} requests in flight)")]
    Saturated { in_flight: usize },

    /// The worker did not finish within the configured timeout.
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    /// The model returned a vector of the wrong width.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding model itself failed.
    #[error("embedding model failed: {0}")]
    Model(#[from] LlmError),

    /// The worker task panicked or was cancelled.
    #[error("embedding worker failed: {0}")]
    Worker(String),

    /// The pool has been shut down.
    #[error("embedding pool closed")]
    Closed,
}
