//! The `retrieve` tool offered to the decide step.
//!
//! The tool's text output is the serialized context (or a sentinel). The
//! fragment count and status ride along in `ToolResult::data` as a
//! [`RetrievalReport`], so the count stays scoped to the request that
//! ran the tool.

use crate::retriever::Retriever;
use async_trait::async_trait;
use simap_core::error::ToolError;
use simap_core::tool::{Tool, ToolResult};
use std::sync::Arc;

pub const RETRIEVE_TOOL_NAME: &str = "retrieve";

pub struct RetrieveTool {
    retriever: Arc<Retriever>,
}

impl RetrieveTool {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        RETRIEVE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Busca en la base de conocimiento SIMAP los fragmentos de trámites y servicios \
         más relevantes para la consulta. Usar siempre antes de responder preguntas sobre \
         trámites, requisitos, prestaciones o servicios de PAMI."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Texto de búsqueda, normalmente la pregunta del usuario"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let retrieval = self.retriever.retrieve(query).await;
        let report = retrieval.report();
        let data = serde_json::to_value(&report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: RETRIEVE_TOOL_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: matches!(
                retrieval.status,
                crate::RetrievalStatus::Found | crate::RetrievalStatus::Empty
            ),
            output: retrieval.context,
            data: Some(data),
        })
    }
}
