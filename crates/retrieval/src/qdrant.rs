//! Qdrant vector store over its REST API.
//!
//! Points are written by the ingestion job with the fragment text under
//! one payload key and the metadata map under another (LangChain's
//! `page_content` / `metadata` by default).

use async_trait::async_trait;
use serde::Deserialize;
use simap_config::VectorStoreConfig;
use simap_core::error::VectorStoreError;
use simap_core::knowledge::{ScoredFragment, VectorStore};
use std::time::Duration;
use tracing::{debug, warn};

pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    content_key: String,
    metadata_key: String,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        content_key: impl Into<String>,
        metadata_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VectorStoreError::Connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            content_key: content_key.into(),
            metadata_key: metadata_key.into(),
            client,
        })
    }

    pub fn from_config(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        Self::new(
            config.url.clone(),
            config.api_key.clone(),
            config.content_key.clone(),
            config.metadata_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Turn one search hit's payload into a fragment. Missing text reads
    /// as empty; a non-object metadata value reads as an empty map.
    fn to_fragment(&self, hit: ApiScoredPoint) -> ScoredFragment {
        let mut payload = hit.payload.unwrap_or_default();
        let content = match payload.remove(&self.content_key) {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let metadata = match payload.remove(&self.metadata_key) {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        ScoredFragment {
            content,
            metadata,
            score: hit.score,
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> VectorStoreError {
    if e.is_timeout() {
        VectorStoreError::Timeout(e.to_string())
    } else {
        VectorStoreError::Connection(e.to_string())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let url = format!("{}/collections/{}", self.base_url, collection);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(status, body = %body, collection, "Qdrant collection check failed");
                Err(VectorStoreError::UnexpectedResponse {
                    status_code: status,
                    message: body,
                })
            }
        }
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, VectorStoreError> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        debug!(collection, limit, dimensions = vector.len(), "Sending Qdrant search");

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                404 => VectorStoreError::CollectionNotFound(collection.to_string()),
                400 | 422 => VectorStoreError::InvalidRequest(body),
                _ => VectorStoreError::UnexpectedResponse {
                    status_code: status,
                    message: body,
                },
            });
        }

        let parsed: ApiSearchResponse =
            response
                .json()
                .await
                .map_err(|e| VectorStoreError::UnexpectedResponse {
                    status_code: 200,
                    message: format!("Failed to parse search response: {e}"),
                })?;

        Ok(parsed.result.into_iter().map(|hit| self.to_fragment(hit)).collect())
    }
}

// --- Qdrant REST types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    result: Vec<ApiScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ApiScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}
