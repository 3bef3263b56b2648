//! Retry wrapper for vector stores.

use async_trait::async_trait;
use simap_core::error::VectorStoreError;
use simap_core::knowledge::{ScoredFragment, VectorStore};
use simap_providers::{RetryPolicy, with_retry};
use std::sync::Arc;

/// Retries unexpected responses, connection failures, and timeouts of
/// the wrapped store. A missing collection or a rejected request is
/// returned at once.
pub struct RetryVectorStore {
    inner: Arc<dyn VectorStore>,
    policy: RetryPolicy,
}

impl RetryVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl VectorStore for RetryVectorStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        with_retry(
            &self.policy,
            "vector_store.collection_exists",
            VectorStoreError::is_retryable,
            || self.inner.collection_exists(collection),
        )
        .await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, VectorStoreError> {
        with_retry(
            &self.policy,
            "vector_store.search",
            VectorStoreError::is_retryable,
            || self.inner.search(collection, vector, limit),
        )
        .await
    }
}
