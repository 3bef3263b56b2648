//! One question, end to end: time it, run the graph, account for tokens,
//! persist the consultation and build the response.

use crate::graph::QuestionGraph;
use serde::{Deserialize, Serialize};
use simap_config::DefaultsConfig;
use simap_core::consultation::NewConsultation;
use simap_storage::ConsultationPersister;
use simap_telemetry::TokenAccountant;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Inbound question, as posted to `/api/complete_analysis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    #[serde(rename = "question_input")]
    pub question: String,
    #[serde(rename = "id_usuario", default)]
    pub user_id: Option<i64>,
    #[serde(rename = "ugel_origen", default)]
    pub unit: Option<String>,
}

impl QuestionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            user_id: None,
            unit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub answer: String,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub document_count: usize,
    pub model: String,
    pub processing_time_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub id_usuario: i64,
    pub ugel_origen: String,
    pub id_consulta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

pub struct QuestionPipeline {
    graph: QuestionGraph,
    accountant: Arc<TokenAccountant>,
    persister: ConsultationPersister,
    defaults: DefaultsConfig,
}

impl QuestionPipeline {
    pub fn new(
        graph: QuestionGraph,
        accountant: Arc<TokenAccountant>,
        persister: ConsultationPersister,
        defaults: DefaultsConfig,
    ) -> Self {
        Self {
            graph,
            accountant,
            persister,
            defaults,
        }
    }

    pub fn model(&self) -> &str {
        self.graph.model()
    }

    pub fn persister(&self) -> &ConsultationPersister {
        &self.persister
    }

    pub async fn handle(&self, request: QuestionRequest) -> AnalysisResponse {
        let started = Instant::now();
        let user_id = request.user_id.unwrap_or(self.defaults.user_id);
        let unit = request
            .unit
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.defaults.unit.clone());

        info!(
            user_id,
            unit = %unit,
            question_chars = request.question.chars().count(),
            "Question received"
        );

        let outcome = self.graph.run(&request.question).await;
        let composition = &outcome.composition;
        let model = self.graph.model().to_string();

        let usage = self
            .accountant
            .summarize(composition.input_tokens, composition.output_tokens, &model);
        let processing_time_ms = started.elapsed().as_millis() as u64;

        let failure = composition.failure.clone();
        let record = NewConsultation {
            user_id,
            unit: unit.clone(),
            question: request.question.clone(),
            answer: composition.reply.clone(),
            answer_is_empty: NewConsultation::is_empty_answer(&composition.reply),
            prompt_id: composition.provenance.to_string(),
            input_tokens: usage.input_tokens as i64,
            output_tokens: usage.output_tokens as i64,
            processing_time_ms: processing_time_ms as i64,
            error_detected: failure.is_some(),
            error_type: failure.as_ref().map(|f| f.kind.as_str().to_string()),
            error_message: failure.as_ref().map(|f| f.message.clone()),
            model: model.clone(),
        };
        let id_consulta = self.persister.persist(record).await;

        info!(
            id_consulta = ?id_consulta,
            document_count = outcome.state.ctx.document_count,
            processing_time_ms,
            error = failure.is_some(),
            "Question completed"
        );

        AnalysisResponse {
            answer: composition.reply.clone(),
            metadata: AnalysisMetadata {
                document_count: outcome.state.ctx.document_count,
                model,
                processing_time_ms,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_tokens: usage.total_tokens,
                id_usuario: user_id,
                ugel_origen: unit,
                id_consulta,
                error: failure.as_ref().map(|_| true),
                error_message: failure.map(|f| f.message),
            },
        }
    }
}
