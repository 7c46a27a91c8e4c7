//! Domain layer for Carrivo.
//!
//! Turns one user message into a grounded reply:
//!
//! - **Context**: per-session history, language and dialect detection,
//!   follow-up rewriting and intent routing ([`ConversationContextManager`])
//! - **Retrieval**: the three-tier cascade from `carrivo-knowledge`, fed by
//!   the bounded embedding pool from `carrivo-llm`
//! - **Assembly**: deduplicated, budgeted context in the reply language
//!   ([`ResponseAssembler`])
//! - **Generation**: prompt building, a link guard and script cleanup
//!
//! # Example
//!
//! ```ignore
//! use carrivo_domain::{DomainServices, LanguageHint};
//!
//! let services = DomainServices::new(context, retrieval, Some(pool), backend, assembler, options);
//! let reply = services
//!     .chat()
//!     .process_message("session-1", "ازاي ابدأ في البرمجة؟", LanguageHint::Auto)
//!     .await?;
//! println!("{}", reply.response_text);
//! ```

pub mod assembler;
pub mod context;
mod error;
pub mod intent;
pub mod language;
pub mod links;
pub mod prompt;
pub mod sanitize;
pub mod services;

pub use assembler::{ContextBlock, ResponseAssembler, SourceRef};
pub use context::{ContextConfig, Contextualization, ConversationContextManager};
pub use error::{DomainError, Result};
pub use intent::{Intent, IntentClassifier, KeywordIntentClassifier, SharedIntentClassifier};
pub use language::{
    Detection, HeuristicDetector, Language, LanguageDetector, LanguageHint,
    SharedLanguageDetector, resolve_response_language,
};
pub use links::{GuardedReply, LINK_PLACEHOLDER, guard_links};
pub use prompt::GenerationParams;
pub use services::DomainServices;
pub use services::backfill::{backfill_embeddings, reindex_embeddings};
pub use services::chat::{
    ChatOptions, ChatResponse, ChatService, DegradationEvent, TurnStage, apology,
};
pub use services::search::{SearchReport, SearchService};
