//! Query embedding, top-k search, and fragment serialization.
//!
//! `retrieve` never fails: store or embedding failures come back as a
//! [`RetrievalStatus`] with a sentinel context, so the graph can carry on
//! and still produce a persisted answer.

use serde::{Deserialize, Serialize};
use simap_core::knowledge::{ScoredFragment, VectorStore};
use simap_core::provider::{EmbeddingRequest, Provider};
use simap_core::error::VectorStoreError;
use std::sync::Arc;
use tracing::{info, warn};

/// Context returned when the knowledge base cannot be reached.
pub const UNAVAILABLE_SENTINEL: &str =
    "No fue posible acceder a la base de conocimiento en este momento.";

/// Context returned when the search matched nothing.
pub const NO_RESULTS_SENTINEL: &str =
    "No se encontró información relevante en la base de conocimiento.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// At least one fragment was returned.
    Found,
    /// The search ran and matched nothing.
    Empty,
    /// The configured collection does not exist.
    CollectionMissing,
    /// Embedding or search failed after retries.
    Unavailable(String),
}

impl RetrievalStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalStatus::Found => "found",
            RetrievalStatus::Empty => "empty",
            RetrievalStatus::CollectionMissing => "collection_missing",
            RetrievalStatus::Unavailable(_) => "unavailable",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            RetrievalStatus::Unavailable(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Serialized fragments, or a sentinel.
    pub context: String,
    pub fragments: Vec<ScoredFragment>,
    pub status: RetrievalStatus,
}

impl Retrieval {
    pub fn document_count(&self) -> usize {
        self.fragments.len()
    }

    fn failed(status: RetrievalStatus) -> Self {
        Self {
            context: UNAVAILABLE_SENTINEL.to_string(),
            fragments: Vec::new(),
            status,
        }
    }

    /// The structured summary handed back through the tool result.
    pub fn report(&self) -> RetrievalReport {
        RetrievalReport {
            document_count: self.document_count(),
            status: self.status.label().to_string(),
            detail: self.status.detail(),
        }
    }
}

/// What the graph needs to know about a retrieval, without the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub document_count: usize,
    /// One of the [`RetrievalStatus::label`] values.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RetrievalReport {
    pub fn status(&self) -> RetrievalStatus {
        match self.status.as_str() {
            "found" => RetrievalStatus::Found,
            "empty" => RetrievalStatus::Empty,
            "collection_missing" => RetrievalStatus::CollectionMissing,
            _ => RetrievalStatus::Unavailable(self.detail.clone().unwrap_or_default()),
        }
    }
}

/// Serialize fragments as `FRAGMENT`/`METADATA` blocks separated by a
/// blank line, in the given order.
pub fn serialize_fragments(fragments: &[ScoredFragment]) -> String {
    fragments
        .iter()
        .map(|f| {
            let metadata = serde_json::Value::Object(f.metadata.clone());
            format!("FRAGMENT: {}\nMETADATA: {}", f.content, metadata)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Retriever {
    provider: Arc<dyn Provider>,
    store: Arc<dyn VectorStore>,
    embedding_model: String,
    collection: String,
    max_results: usize,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn VectorStore>,
        embedding_model: impl Into<String>,
        collection: impl Into<String>,
        max_results: usize,
    ) -> Self {
        Self {
            provider,
            store,
            embedding_model: embedding_model.into(),
            collection: collection.into(),
            max_results: max_results.max(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn retrieve(&self, query: &str) -> Retrieval {
        let retrieval = self.run(query).await;
        match &retrieval.status {
            RetrievalStatus::Unavailable(reason) => warn!(
                collection = %self.collection,
                reason = %reason,
                "Retrieval unavailable"
            ),
            status => info!(
                collection = %self.collection,
                query_chars = query.chars().count(),
                document_count = retrieval.document_count(),
                status = status.label(),
                "Retrieval finished"
            ),
        }
        retrieval
    }

    async fn run(&self, query: &str) -> Retrieval {
        match self.store.collection_exists(&self.collection).await {
            Ok(true) => {}
            Ok(false) => return Retrieval::failed(RetrievalStatus::CollectionMissing),
            Err(e) => return Retrieval::failed(RetrievalStatus::Unavailable(e.to_string())),
        }

        let embedding = match self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
        {
            Ok(response) => response.embeddings.into_iter().next(),
            Err(e) => return Retrieval::failed(RetrievalStatus::Unavailable(e.to_string())),
        };
        let Some(vector) = embedding else {
            return Retrieval::failed(RetrievalStatus::Unavailable(
                "embedding response was empty".into(),
            ));
        };

        let fragments = match self
            .store
            .search(&self.collection, &vector, self.max_results)
            .await
        {
            Ok(hits) => hits,
            Err(VectorStoreError::CollectionNotFound(_)) => {
                return Retrieval::failed(RetrievalStatus::CollectionMissing);
            }
            Err(e) => return Retrieval::failed(RetrievalStatus::Unavailable(e.to_string())),
        };

        if fragments.is_empty() {
            return Retrieval {
                context: NO_RESULTS_SENTINEL.to_string(),
                fragments,
                status: RetrievalStatus::Empty,
            };
        }

        Retrieval {
            context: serialize_fragments(&fragments),
            fragments,
            status: RetrievalStatus::Found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use simap_core::error::ProviderError;
    use simap_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl Provider for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("embed only".into()))
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![0.1, 0.2, 0.3]).collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    struct MemoryStore {
        exists: bool,
        fragments: Vec<ScoredFragment>,
        last_limit: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        fn name(&self) -> &str {
            "memory"
        }

        async fn collection_exists(&self, _collection: &str) -> Result<bool, VectorStoreError> {
            Ok(self.exists)
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<ScoredFragment>, VectorStoreError> {
            *self.last_limit.lock().unwrap() = Some(limit);
            Ok(self.fragments.iter().take(limit).cloned().collect())
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }

        async fn collection_exists(&self, _collection: &str) -> Result<bool, VectorStoreError> {
            Err(VectorStoreError::Connection("connection refused".into()))
        }

        async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<ScoredFragment>, VectorStoreError> {
            Err(VectorStoreError::Connection("connection refused".into()))
        }
    }

    fn fragment(content: &str, id_sub: i64, score: f32) -> ScoredFragment {
        let mut metadata = serde_json::Map::new();
        metadata.insert("servicio".into(), "Medicamentos".into());
        metadata.insert("id_sub".into(), id_sub.into());
        ScoredFragment {
            content: content.into(),
            metadata,
            score,
        }
    }

    fn retriever(store: Arc<dyn VectorStore>, k: usize) -> Retriever {
        Retriever::new(Arc::new(FixedEmbedder), store, "text-embedding-3-small", "simap_servicios", k)
    }

    #[test]
    fn serialization_keeps_order_and_blank_line() {
        let text = serialize_fragments(&[fragment("Primero", 1, 0.9), fragment("Segundo", 2, 0.9)]);
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("FRAGMENT: Primero\nMETADATA: {"));
        assert!(blocks[0].contains("\"id_sub\":1"));
        assert!(blocks[1].starts_with("FRAGMENT: Segundo"));
    }

    #[tokio::test]
    async fn uses_configured_top_k() {
        let store = Arc::new(MemoryStore {
            exists: true,
            fragments: (0..10).map(|i| fragment("insulina", i, 0.5)).collect(),
            last_limit: Mutex::new(None),
        });
        let retrieval = retriever(store.clone(), 4).retrieve("insulina").await;
        assert_eq!(retrieval.status, RetrievalStatus::Found);
        assert_eq!(retrieval.document_count(), 4);
        assert_eq!(*store.last_limit.lock().unwrap(), Some(4));
    }

    #[tokio::test]
    async fn empty_search_returns_no_results_sentinel() {
        let store = Arc::new(MemoryStore {
            exists: true,
            fragments: vec![],
            last_limit: Mutex::new(None),
        });
        let retrieval = retriever(store, 4).retrieve("insulina").await;
        assert_eq!(retrieval.status, RetrievalStatus::Empty);
        assert_eq!(retrieval.context, NO_RESULTS_SENTINEL);
        assert_eq!(retrieval.document_count(), 0);
    }

    #[tokio::test]
    async fn missing_collection_is_reported() {
        let store = Arc::new(MemoryStore {
            exists: false,
            fragments: vec![fragment("x", 1, 0.1)],
            last_limit: Mutex::new(None),
        });
        let retrieval = retriever(store, 4).retrieve("insulina").await;
        assert_eq!(retrieval.status, RetrievalStatus::CollectionMissing);
        assert_eq!(retrieval.context, UNAVAILABLE_SENTINEL);
    }

    #[tokio::test]
    async fn store_failure_never_raises() {
        let retrieval = retriever(Arc::new(DownStore), 4).retrieve("insulina").await;
        assert!(matches!(retrieval.status, RetrievalStatus::Unavailable(ref m) if m.contains("refused")));
        assert_eq!(retrieval.document_count(), 0);
        assert_eq!(retrieval.context, UNAVAILABLE_SENTINEL);
    }

    #[tokio::test]
    async fn report_carries_status_through_json() {
        let retrieval = retriever(Arc::new(DownStore), 4).retrieve("insulina").await;
        let value = serde_json::to_value(retrieval.report()).unwrap();
        assert_eq!(value["status"], "unavailable");
        assert_eq!(value["document_count"], 0);
        let back: RetrievalReport = serde_json::from_value(value).unwrap();
        assert_eq!(back.status(), retrieval.status);
    }
}
