//! Error types for the knowledge crate.

use thiserror::Error;

/// Errors that can occur while storing or retrieving knowledge items.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote index could not be reached or timed out.
    #[error("Remote index unavailable: {0}")]
    Unavailable(String),

    /// The remote index answered with an error status.
    #[error("Remote index error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// Requested item not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Stored vectors were built for a different dimension.
    #[error(
        "stored vectors have {stored} dimensions but {configured} are configured; reindex required"
    )]
    StaleVectors { stored: usize, configured: usize },
}

impl From<reqwest::Error> for KnowledgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            KnowledgeError::InvalidData(err.to_string())
        } else {
            KnowledgeError::Unavailable(err.to_string())
        }
    }
}

/// Result type alias for knowledge operations.
pub type Result<T> = std::result::Result<T, KnowledgeError>;
