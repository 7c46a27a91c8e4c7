//! Error types for session history operations.

/// Error type for session history operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session identifier is empty or malformed.
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Error from the turn persistence backend.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// SQLite failure in the bundled turn store.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for session history operations.
pub type Result<T> = std::result::Result<T, SessionError>;
