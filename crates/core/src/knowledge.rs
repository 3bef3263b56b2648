//! VectorStore trait: the indexed SIMAP knowledge base.
//!
//! The store is populated by a separate ingestion job; this service only
//! checks that the collection exists and runs top-k cosine searches against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::VectorStoreError;

/// One fragment returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFragment {
    /// The indexed procedural text.
    pub content: String,

    /// Ingestion metadata (servicio, tipo, subtipo, id_sub, fecha_carga, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Cosine similarity reported by the store.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// A human-readable backend name (e.g., "qdrant").
    fn name(&self) -> &str;

    /// Whether the named collection exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError>;

    /// Top-`limit` fragments by descending similarity.
    ///
    /// Implementations must keep the store's own order for equal scores.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, VectorStoreError>;
}
