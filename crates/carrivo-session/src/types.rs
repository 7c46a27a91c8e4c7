//! Turns and per-session history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// One immutable message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    /// Language code such as `ar_EG`, `ar` or `en`.
    pub language: String,
    pub is_dialect: bool,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            language: language.into(),
            is_dialect: false,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text, language)
    }

    pub fn assistant(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text, language)
    }

    pub fn with_dialect(mut self, is_dialect: bool) -> Self {
        self.is_dialect = is_dialect;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// The most recent turns of one session.
///
/// Holds at most `limit` turns, oldest first. Timestamps never go
/// backwards: a turn stamped earlier than the last one is restamped.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    session_id: String,
    turns: VecDeque<Turn>,
    limit: usize,
    default_language: Option<String>,
    pub(crate) loaded: bool,
}

impl SessionHistory {
    pub fn new(session_id: impl Into<String>, limit: usize) -> Self {
        Self {
            session_id: session_id.into(),
            turns: VecDeque::with_capacity(limit),
            limit: limit.max(1),
            default_language: None,
            loaded: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a turn, dropping the oldest beyond the limit.
    pub fn push(&mut self, mut turn: Turn) {
        if let Some(last) = self.turns.back() {
            if turn.created_at < last.created_at {
                turn.created_at = last.created_at;
            }
        }
        if turn.role == TurnRole::User && self.default_language.is_none() {
            self.default_language = Some(turn.language.clone());
        }
        self.turns.push_back(turn);
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Language of the session's first user turn.
    pub fn default_language(&self) -> Option<&str> {
        self.default_language.as_deref()
    }

    pub fn set_default_language(&mut self, language: impl Into<String>) {
        self.default_language = Some(language.into());
    }
}
