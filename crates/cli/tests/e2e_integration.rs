//! End-to-end tests for the SIMAP question service.
//!
//! These drive the HTTP router with a scripted model, an in-memory vector
//! store and an in-memory SQLite database, and check both the responses
//! and the persisted consultation rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;

use simap_agent::{
    APOLOGY_TEXT, AnswerComposer, PromptProvider, QuestionGraph, QuestionPipeline, REFUSAL_TEXT,
};
use simap_config::{DefaultsConfig, PromptConfig};
use simap_core::consultation::{ConsultationStore, Usefulness};
use simap_core::error::{ProviderError, VectorStoreError};
use simap_core::knowledge::{ScoredFragment, VectorStore};
use simap_core::message::{Message, MessageToolCall};
use simap_core::prompt::PromptRepository;
use simap_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use simap_core::tool::ToolRegistry;
use simap_gateway::{AppState, build_router};
use simap_providers::RetryPolicy;
use simap_retrieval::{RetrieveTool, RetryVectorStore, Retriever};
use simap_storage::{ConsultationPersister, Database};
use simap_telemetry::TokenAccountant;

// ── Mock model ───────────────────────────────────────────────────────────

/// Asks for retrieval on the first call of each question (no tool result
/// yet), then answers with a fixed text.
struct ScriptedModel {
    answer: String,
}

#[async_trait::async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let message = if request.tools.is_empty() {
            Message::assistant(self.answer.clone())
        } else {
            let mut message = Message::assistant("");
            message.tool_calls = vec![MessageToolCall {
                id: "call_1".into(),
                name: "retrieve".into(),
                arguments: r#"{"query":"consulta"}"#.into(),
            }];
            message
        };
        Ok(ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 50,
                completion_tokens: 20,
                total_tokens: 70,
            }),
            model: "gpt-4o-mini".into(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vec![0.5; 8]).collect(),
            model: request.model,
            usage: None,
        })
    }
}

// ── Mock vector store ────────────────────────────────────────────────────

struct FragmentStore {
    fragments: Vec<ScoredFragment>,
    refuse_connections: bool,
    calls: AtomicUsize,
}

impl FragmentStore {
    fn with(contents: &[&str], service: &str) -> Self {
        let fragments = contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("servicio".into(), service.into());
                metadata.insert("id_sub".into(), (400 + i).into());
                ScoredFragment {
                    content: content.to_string(),
                    metadata,
                    score: 0.9 - i as f32 * 0.05,
                }
            })
            .collect();
        Self {
            fragments,
            refuse_connections: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            fragments: Vec::new(),
            refuse_connections: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorStore for FragmentStore {
    fn name(&self) -> &str {
        "fragments"
    }

    async fn collection_exists(&self, _collection: &str) -> Result<bool, VectorStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections {
            return Err(VectorStoreError::Connection("connection refused".into()));
        }
        Ok(true)
    }

    async fn search(
        &self,
        _collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredFragment>, VectorStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections {
            return Err(VectorStoreError::Connection("connection refused".into()));
        }
        Ok(self.fragments.iter().take(limit).cloned().collect())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    router: axum::Router,
    db: Arc<Database>,
}

async fn harness(answer: &str, store: Arc<FragmentStore>) -> Harness {
    let db = Arc::new(Database::in_memory().await.unwrap());
    db.activate_prompt("simap_base", "Respondé solo con los fragmentos del SIMAP.", "1.0")
        .await
        .unwrap();

    let provider: Arc<dyn Provider> = Arc::new(ScriptedModel {
        answer: answer.to_string(),
    });
    let store: Arc<dyn VectorStore> = Arc::new(RetryVectorStore::new(store, RetryPolicy::immediate(5)));
    let retriever = Retriever::new(provider.clone(), store, "text-embedding-3-small", "simap_servicios", 4);
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(RetrieveTool::new(Arc::new(retriever))));

    let accountant = Arc::new(TokenAccountant::new());
    let composer = AnswerComposer::new(
        provider.clone(),
        Arc::new(PromptProvider::new(Some(db.clone()), &PromptConfig::default())),
        accountant.clone(),
        "gpt-4o-mini",
        0.0,
    );
    let pipeline = QuestionPipeline::new(
        QuestionGraph::new(provider, Arc::new(tools), composer, 0.0),
        accountant,
        ConsultationPersister::new(db.clone()),
        DefaultsConfig::default(),
    );

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        consultations: db.clone(),
        database_driver: db.driver().to_string(),
    });
    Harness {
        router: build_router(state),
        db,
    }
}

impl Harness {
    async fn post(&self, uri: &str, body: serde_json::Value) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn ask(&self, question: &str) -> serde_json::Value {
        let response = self
            .post(
                "/api/complete_analysis",
                serde_json::json!({ "question_input": question }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

const INSULIN_FRAGMENTS: [&str; 4] = [
    "Insulina: se entrega con receta electrónica vigente emitida por el médico de cabecera.",
    "Insulina glargina: requiere formulario de tratamiento prolongado y autorización previa.",
    "Insulina: la agencia verifica la afiliación y carga la solicitud en el sistema.",
    "Insumos para diabetes: tiras reactivas y lancetas se gestionan junto con la insulina.",
];

fn insulin_answer() -> String {
    "Para tramitar la insulina el afiliado necesita una receta electrónica vigente \
     emitida por su médico de cabecera. Si se trata de insulina glargina, además \
     debe presentar el formulario de tratamiento prolongado, que requiere autorización \
     previa. En la agencia se verifica la afiliación y se carga la solicitud en el \
     sistema. Las tiras reactivas y lancetas se pueden gestionar en el mismo trámite. \
     Ante cualquier duda, consulte al médico de cabecera o a la agencia más cercana."
        .to_string()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn grounded_question_is_answered_and_persisted() {
    let store = Arc::new(FragmentStore::with(&INSULIN_FRAGMENTS, "Medicamentos"));
    let h = harness(&insulin_answer(), store).await;

    let body = h.ask("¿Cómo tramitar la insulina?").await;
    let answer = body["answer"].as_str().unwrap();
    let meta = &body["metadata"];

    assert!(answer.starts_with("Para tramitar la insulina"));
    assert!(answer.chars().count() > 300);
    assert_eq!(meta["document_count"], 4);
    assert_eq!(meta["id_usuario"], 321);
    assert_eq!(meta["ugel_origen"], "Formosa");
    assert!(meta.get("error").is_none());
    assert_eq!(
        meta["total_tokens"].as_u64().unwrap(),
        meta["input_tokens"].as_u64().unwrap() + meta["output_tokens"].as_u64().unwrap()
    );

    let id = meta["id_consulta"].as_i64().unwrap();
    let row = h.db.get(id).await.unwrap().unwrap();
    assert_eq!(row.record.answer, answer);
    assert_eq!(row.record.user_id, 321);
    assert_eq!(row.record.unit, "Formosa");
    assert!(!row.record.answer_is_empty);
    assert!(!row.record.error_detected);
    assert_eq!(row.usefulness, Usefulness::Unset);
    assert!(answer.ends_with(&format!("\nvp:{}", row.record.prompt_id)));
}

#[tokio::test]
async fn off_topic_question_is_refused() {
    let store = Arc::new(FragmentStore::with(
        &[
            "Pensión no contributiva: trámite ante ANSES con DNI y certificado.",
            "Pensión por invalidez: se inicia con la historia médica del afiliado.",
            "Pensión graciable: requiere nota firmada por el solicitante.",
            "Pensión para madres de siete hijos: documentación de cada hijo.",
        ],
        "Pensiones",
    ));
    let h = harness("nunca se usa", store).await;

    let body = h.ask("¿Pronóstico climático porteño?").await;
    assert_eq!(body["answer"], REFUSAL_TEXT);
    assert_eq!(body["metadata"]["document_count"], 4);
    assert!(body["metadata"].get("error").is_none());

    let id = body["metadata"]["id_consulta"].as_i64().unwrap();
    let row = h.db.get(id).await.unwrap().unwrap();
    assert!(row.record.answer_is_empty);
    assert!(!row.record.error_detected);
}

#[tokio::test]
async fn unreachable_store_yields_apology_after_retries() {
    let store = Arc::new(FragmentStore::unreachable());
    let h = harness("nunca se usa", store.clone()).await;

    let body = h.ask("¿Cómo tramitar la insulina?").await;
    assert_eq!(body["answer"], APOLOGY_TEXT);
    assert_eq!(body["metadata"]["document_count"], 0);
    assert_eq!(body["metadata"]["error"], true);
    assert!(
        body["metadata"]["error_message"]
            .as_str()
            .unwrap()
            .contains("connection refused")
    );
    assert_eq!(store.calls(), 5);

    let id = body["metadata"]["id_consulta"].as_i64().unwrap();
    let row = h.db.get(id).await.unwrap().unwrap();
    assert!(row.record.error_detected);
    assert_eq!(row.record.error_type.as_deref(), Some("base_conocimiento_no_disponible"));
    assert!(row.record.error_message.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn repeated_feedback_is_idempotent() {
    let store = Arc::new(FragmentStore::with(&INSULIN_FRAGMENTS, "Medicamentos"));
    let h = harness(&insulin_answer(), store).await;
    let id = h.ask("¿Cómo tramitar la insulina?").await["metadata"]["id_consulta"]
        .as_i64()
        .unwrap();

    for _ in 0..2 {
        let response = h
            .post(
                "/api/feedback",
                serde_json::json!({ "consultation_id": id, "feedback_value": "me_gusta" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["respuesta_util"], "si");
    }
    assert_eq!(h.db.get(id).await.unwrap().unwrap().usefulness, Usefulness::Yes);
}

#[tokio::test]
async fn later_feedback_overrides_earlier() {
    let store = Arc::new(FragmentStore::with(&INSULIN_FRAGMENTS, "Medicamentos"));
    let h = harness(&insulin_answer(), store).await;
    let id = h.ask("¿Cómo tramitar la insulina?").await["metadata"]["id_consulta"]
        .as_i64()
        .unwrap();

    for value in ["me_gusta", "no_me_gusta"] {
        let response = h
            .post(
                "/api/feedback",
                serde_json::json!({ "id_consulta": id, "feedback_value": value }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(h.db.get(id).await.unwrap().unwrap().usefulness, Usefulness::No);
}

#[tokio::test]
async fn oversized_comment_is_rejected_without_side_effects() {
    let store = Arc::new(FragmentStore::with(&INSULIN_FRAGMENTS, "Medicamentos"));
    let h = harness(&insulin_answer(), store).await;
    let id = h.ask("¿Cómo tramitar la insulina?").await["metadata"]["id_consulta"]
        .as_i64()
        .unwrap();

    let response = h
        .post(
            "/api/comentario",
            serde_json::json!({ "consultation_id": id, "comentario": "Muy clara la respuesta" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .post(
            "/api/comentario",
            serde_json::json!({ "consultation_id": id, "comentario": "x".repeat(260) }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());

    let row = h.db.get(id).await.unwrap().unwrap();
    assert_eq!(row.comment.as_deref(), Some("Muy clara la respuesta"));
}

#[tokio::test]
async fn unknown_consultation_is_404() {
    let store = Arc::new(FragmentStore::with(&INSULIN_FRAGMENTS, "Medicamentos"));
    let h = harness(&insulin_answer(), store).await;

    let response = h
        .post(
            "/api/feedback",
            serde_json::json!({ "consultation_id": 9_999, "feedback_value": "me_gusta" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
