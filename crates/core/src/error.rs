//! Error types for the SIMAP domain.
//!
//! Each bounded context has its own enum. Every enum answers
//! `is_retryable()`, which is the only predicate the retry layer consults.

use thiserror::Error;

/// The top-level error type for SIMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Vector store errors ---
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    // --- Relational store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_retryable(),
            Error::VectorStore(e) => e.is_retryable(),
            Error::Store(e) => e.is_retryable(),
            Error::Tool(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Rate limits, timeouts, connection failures, and generic API errors
    /// are worth another attempt. Malformed requests and auth failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => true,
            ProviderError::ApiError { status_code, .. } => {
                !matches!(status_code, 400 | 404 | 413 | 422)
            }
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum VectorStoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Unexpected response from vector store: {message} (status: {status_code})")]
    UnexpectedResponse { status_code: u16, message: String },

    #[error("Vector store connection failed: {0}")]
    Connection(String),

    #[error("Vector store request timed out: {0}")]
    Timeout(String),

    #[error("Invalid vector store request: {0}")]
    InvalidRequest(String),
}

impl VectorStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorStoreError::UnexpectedResponse { .. }
                | VectorStoreError::Connection(_)
                | VectorStoreError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Consultation not found: {0}")]
    NotFound(i64),

    #[error("Schema bootstrap failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}
