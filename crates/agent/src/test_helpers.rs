//! Shared test doubles for the pipeline tests.

use async_trait::async_trait;
use simap_core::error::{ProviderError, StoreError, VectorStoreError};
use simap_core::knowledge::{ScoredFragment, VectorStore};
use simap_core::message::{Message, MessageToolCall};
use simap_core::prompt::{PromptRepository, StoredPrompt};
use simap_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use std::sync::Mutex;

/// A provider that returns scripted results in sequence and records every
/// request it receives. Embedding calls always succeed.
///
/// Panics if more completions are requested than were scripted.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// First a `retrieve` tool call for `query`, then `answer`.
    pub fn retrieve_then_answer(query: &str, answer: &str) -> Self {
        Self::new(vec![
            Ok(make_tool_call_response(vec![make_tool_call(
                "retrieve",
                serde_json::json!({ "query": query }),
            )])),
            Ok(make_text_response(answer)),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!(
                "SequentialMockProvider: no more responses (call #{})",
                requests.len()
            );
        }
        requests.push(request);
        responses.remove(0)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vec![0.1, 0.2, 0.3]).collect(),
            model: request.model,
            usage: None,
        })
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// In-memory vector store returning fixed fragments, or failing.
pub struct MemoryVectorStore {
    exists: bool,
    fragments: Vec<ScoredFragment>,
    failure: Option<VectorStoreError>,
}

impl MemoryVectorStore {
    pub fn with_contents(contents: &[&str]) -> Self {
        Self {
            exists: true,
            fragments: contents.iter().map(|c| fragment(c)).collect(),
            failure: None,
        }
    }

    pub fn missing_collection() -> Self {
        Self {
            exists: false,
            fragments: Vec::new(),
            failure: None,
        }
    }

    pub fn failing(error: VectorStoreError) -> Self {
        Self {
            exists: true,
            fragments: Vec::new(),
            failure: Some(error),
        }
    }
}

pub fn fragment(content: &str) -> ScoredFragment {
    let mut metadata = serde_json::Map::new();
    metadata.insert("servicio".into(), "Medicamentos".into());
    metadata.insert("id_sub".into(), 301.into());
    ScoredFragment {
        content: content.into(),
        metadata,
        score: 0.87,
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn collection_exists(&self, _collection: &str) -> Result<bool, VectorStoreError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(self.exists),
        }
    }

    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, VectorStoreError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(self.fragments.iter().take(limit).cloned().collect()),
        }
    }
}

/// Prompt repository holding at most one active prompt.
pub struct StaticPrompts {
    active: Mutex<Option<StoredPrompt>>,
    fail: bool,
}

impl StaticPrompts {
    pub fn active(id: i64, content: &str) -> Self {
        let prompts = Self::none();
        prompts.set(id, content);
        prompts
    }

    pub fn none() -> Self {
        Self {
            active: Mutex::new(None),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            active: Mutex::new(None),
            fail: true,
        }
    }

    pub fn set(&self, id: i64, content: &str) {
        *self.active.lock().unwrap() = Some(StoredPrompt {
            id,
            name: "base".into(),
            content: content.into(),
            version: format!("{id}.0"),
            active: true,
            created_at: "2026-01-01 00:00:00".into(),
        });
    }
}

#[async_trait]
impl PromptRepository for StaticPrompts {
    async fn active_prompt(&self) -> Result<Option<StoredPrompt>, StoreError> {
        if self.fail {
            return Err(StoreError::Connection("database unreachable".into()));
        }
        Ok(self.active.lock().unwrap().clone())
    }

    async fn activate_prompt(&self, _name: &str, content: &str, _version: &str) -> Result<i64, StoreError> {
        let id = self.active.lock().unwrap().as_ref().map_or(1, |p| p.id + 1);
        self.set(id, content);
        Ok(id)
    }
}
