//! LLM provider implementations for the SIMAP service.
//!
//! [`OpenAiCompatProvider`] talks to any OpenAI-compatible endpoint for
//! both chat completions and embeddings. [`RetryProvider`] wraps any
//! provider with exponential backoff; [`retry`] exposes the same loop for
//! other outbound clients (the vector store).

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryProvider, with_retry};
