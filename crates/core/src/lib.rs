//! # SIMAP Core
//!
//! Domain types, traits, and error definitions for the SIMAP
//! question-answering service. This crate performs no I/O; it defines the
//! model that the provider, retrieval, storage, and agent crates implement
//! against.
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] for chat completions and embeddings
//! - [`VectorStore`] for the indexed knowledge base
//! - [`ConsultationStore`] and [`PromptRepository`] for the relational store
//! - [`Tool`] for capabilities bound to the language model

pub mod consultation;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod tool;

pub use consultation::{
    CommentError, Consultation, ConsultationStore, NewConsultation, Usefulness, validate_comment,
};
pub use error::{Error, ProviderError, Result, StoreError, ToolError, VectorStoreError};
pub use knowledge::{ScoredFragment, VectorStore};
pub use message::{Message, MessageToolCall, Role};
pub use prompt::{PromptProvenance, PromptRepository, StoredPrompt, SystemPrompt};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
