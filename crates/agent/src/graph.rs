//! The question graph: decide → (retrieve) → generate.
//!
//! `decide` offers the `retrieve` tool to the model. The edge to
//! `retrieve` is taken only when the model asked for it; otherwise the
//! graph goes straight to `generate`, which refuses when nothing was
//! retrieved. Node failures never escape: they are recorded in the
//! request context and turned into the apology by the composer.

use crate::composer::{AnswerComposer, Composition};
use crate::state::{Failure, FailureKind, GraphState};
use simap_core::message::{Message, MessageToolCall};
use simap_core::provider::{Provider, ProviderRequest};
use simap_core::tool::{ToolCall, ToolRegistry};
use simap_retrieval::{RETRIEVE_TOOL_NAME, RetrievalReport, RetrievalStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Decide,
    Retrieve,
    Generate,
}

/// A finished graph run.
#[derive(Debug, Clone)]
pub struct GraphOutcome {
    pub state: GraphState,
    pub composition: Composition,
    /// Nodes in the order they ran.
    pub path: Vec<Node>,
}

impl GraphOutcome {
    pub fn answer(&self) -> &str {
        &self.composition.reply
    }
}

pub struct QuestionGraph {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    composer: AnswerComposer,
    model: String,
    temperature: f32,
}

impl QuestionGraph {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        composer: AnswerComposer,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            tools,
            model: composer.model().to_string(),
            composer,
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn run(&self, question: &str) -> GraphOutcome {
        let mut state = GraphState::new(question);
        let mut path = Vec::with_capacity(3);
        let mut node = Node::Decide;

        loop {
            path.push(node);
            debug!(?node, "Entering node");
            node = match node {
                Node::Decide => self.decide(&mut state).await,
                Node::Retrieve => self.retrieve(&mut state).await,
                Node::Generate => {
                    let composition = self.composer.compose(&state).await;
                    state.push(Message::assistant(composition.reply.clone()));
                    return GraphOutcome {
                        state,
                        composition,
                        path,
                    };
                }
            };
        }
    }

    async fn decide(&self, state: &mut GraphState) -> Node {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: state.messages.clone(),
            temperature: self.temperature,
            max_tokens: None,
            tools: self.tools.definitions(),
        };

        match self.provider.complete(request).await {
            Ok(response) => {
                let wants_retrieval = response.message.tool_call(RETRIEVE_TOOL_NAME).is_some();
                debug!(wants_retrieval, "Decide step finished");
                state.push(response.message);
                if wants_retrieval {
                    Node::Retrieve
                } else {
                    info!("Model answered without requesting retrieval");
                    Node::Generate
                }
            }
            Err(e) => {
                warn!(error = %e, "Decide step failed");
                state.ctx.fail(Failure::new(FailureKind::LlmUnavailable, e.to_string()));
                Node::Generate
            }
        }
    }

    async fn retrieve(&self, state: &mut GraphState) -> Node {
        let Some(requested) = state
            .last_assistant()
            .and_then(|m| m.tool_call(RETRIEVE_TOOL_NAME))
            .cloned()
        else {
            return Node::Generate;
        };

        let call = ToolCall {
            id: requested.id.clone(),
            name: RETRIEVE_TOOL_NAME.to_string(),
            arguments: serde_json::json!({ "query": search_text(&requested, state.question()) }),
        };

        match self.tools.execute(&call).await {
            Ok(result) => {
                let report = result
                    .data
                    .and_then(|data| serde_json::from_value::<RetrievalReport>(data).ok());
                state.push(Message::tool_result(call.id, result.output));

                if let Some(report) = report {
                    state.ctx.document_count = report.document_count;
                    let status = report.status();
                    match &status {
                        RetrievalStatus::Unavailable(reason) => state
                            .ctx
                            .fail(Failure::new(FailureKind::StoreUnavailable, reason.clone())),
                        RetrievalStatus::CollectionMissing => state.ctx.fail(Failure::new(
                            FailureKind::CollectionMissing,
                            "La colección configurada no existe en la base de conocimiento",
                        )),
                        RetrievalStatus::Found | RetrievalStatus::Empty => {}
                    }
                    state.ctx.retrieval = Some(status);
                }
            }
            Err(e) => {
                warn!(error = %e, "Retrieve tool failed");
                state
                    .ctx
                    .fail(Failure::new(FailureKind::StoreUnavailable, e.to_string()));
            }
        }

        Node::Generate
    }
}

/// The model's `query` argument, or the question when it is missing or blank.
fn search_text(call: &MessageToolCall, question: &str) -> String {
    serde_json::from_str::<serde_json::Value>(&call.arguments)
        .ok()
        .and_then(|args| args["query"].as_str().map(str::trim).map(String::from))
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| question.to_string())
}
