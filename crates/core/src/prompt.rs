//! System prompt records and their provenance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::StoreError;

/// Where the system prompt for a request came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptProvenance {
    /// The active row in the prompts table.
    Database(i64),
    /// The fallback text file, by basename.
    File(String),
    /// The built-in minimal prompt.
    HardCoded,
}

impl fmt::Display for PromptProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptProvenance::Database(id) => write!(f, "database:{id}"),
            PromptProvenance::File(name) => write!(f, "file:{name}"),
            PromptProvenance::HardCoded => write!(f, "hard-coded"),
        }
    }
}

/// A resolved system prompt.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    pub content: String,
    pub provenance: PromptProvenance,
}

/// A row of the prompts table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPrompt {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub version: String,
    pub active: bool,
    pub created_at: String,
}

#[async_trait]
pub trait PromptRepository: Send + Sync {
    /// The single active prompt, if any.
    async fn active_prompt(&self) -> Result<Option<StoredPrompt>, StoreError>;

    /// Insert a prompt and make it the only active one. Returns its id.
    async fn activate_prompt(
        &self,
        name: &str,
        content: &str,
        version: &str,
    ) -> Result<i64, StoreError>;
}
