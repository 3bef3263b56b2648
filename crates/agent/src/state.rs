//! Per-request graph state.

use simap_core::message::{Message, Role};
use simap_retrieval::RetrievalStatus;
use std::fmt;

/// Why a request could not be answered from the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The LLM failed in the decide or generate step.
    LlmUnavailable,
    /// Embedding or vector search failed after retries.
    StoreUnavailable,
    /// The configured collection does not exist.
    CollectionMissing,
}

impl FailureKind {
    /// The value stored in `tipo_error`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::LlmUnavailable => "llm_no_disponible",
            FailureKind::StoreUnavailable => "base_conocimiento_no_disponible",
            FailureKind::CollectionMissing => "coleccion_inexistente",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Facts gathered while the graph runs, scoped to one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Fragments returned by this request's retrieval.
    pub document_count: usize,
    pub retrieval: Option<RetrievalStatus>,
    /// First failure seen; later steps do not overwrite it.
    pub failure: Option<Failure>,
}

impl RequestContext {
    pub fn fail(&mut self, failure: Failure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

/// Append-only message history plus the request context.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub messages: Vec<Message>,
    pub ctx: RequestContext,
}

impl GraphState {
    pub fn new(question: &str) -> Self {
        Self {
            messages: vec![Message::user(question)],
            ctx: RequestContext::default(),
        }
    }

    /// The original user question.
    pub fn question(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Tool message contents in chronological order, joined by a blank line.
    pub fn docs_content(&self) -> String {
        let mut docs: Vec<&str> = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        docs.reverse();
        docs.join("\n\n")
    }

    /// User and system messages, which are what the generate step forwards.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::System))
    }
}
