//! Domain services.
//!
//! Chat, search and embedding maintenance, wired from shared collaborators.

pub mod backfill;
pub mod chat;
pub mod search;

use std::sync::Arc;

use carrivo_knowledge::RetrievalOrchestrator;
use carrivo_llm::{EmbeddingPool, SharedBackend};
use tracing::info;

use crate::assembler::ResponseAssembler;
use crate::context::ConversationContextManager;
use crate::intent::KeywordIntentClassifier;

/// Domain services facade.
///
/// The entry point for transport layers (CLI, REPL).
#[derive(Clone)]
pub struct DomainServices {
    chat: chat::ChatService,
    search: search::SearchService,
}

impl DomainServices {
    pub fn new(
        context: Arc<ConversationContextManager>,
        retrieval: RetrievalOrchestrator,
        embeddings: Option<EmbeddingPool>,
        generator: SharedBackend,
        assembler: ResponseAssembler,
        options: chat::ChatOptions,
    ) -> Self {
        info!(
            embeddings = embeddings.as_ref().map(|p| p.model_name()),
            backend = generator.name(),
            "Initializing domain services"
        );

        let search = search::SearchService::new(
            retrieval.clone(),
            embeddings.clone(),
            Arc::new(KeywordIntentClassifier::new()),
        );

        let mut chat = chat::ChatService::new(context, retrieval, generator)
            .with_assembler(assembler)
            .with_options(options);
        if let Some(pool) = embeddings {
            chat = chat.with_embeddings(pool);
        }

        Self { chat, search }
    }

    pub fn chat(&self) -> &chat::ChatService {
        &self.chat
    }

    pub fn search(&self) -> &search::SearchService {
        &self.search
    }
}
