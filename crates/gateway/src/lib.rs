//! HTTP surface for the SIMAP question service.
//!
//! Routes:
//! - `POST /api/complete_analysis`: run the question pipeline
//! - `POST /api/feedback`: set the usefulness flag of a consultation
//! - `POST /api/comentario`: attach a comment to a consultation
//! - `GET /health`: liveness plus the live database driver
//!
//! Upstream LLM and vector-store failures never surface as 5xx: the
//! pipeline answers with an apology and flags the error in the metadata.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use simap_agent::{AnalysisResponse, QuestionPipeline, QuestionRequest};
use simap_core::consultation::{ConsultationStore, Usefulness, validate_comment};
use simap_core::error::StoreError;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct AppState {
    pub pipeline: Arc<QuestionPipeline>,
    pub consultations: Arc<dyn ConsultationStore>,
    /// `mysql` or `sqlite`, reported by `/health`.
    pub database_driver: String,
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/complete_analysis", post(complete_analysis_handler))
        .route("/api/feedback", post(feedback_handler))
        .route("/api/comentario", post(comment_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Errors ---

/// An error response with a `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn from_store(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("Consulta {id} no encontrada"),
            },
            other => {
                error!(error = %other, "Consultation update failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Error interno al actualizar la consulta".into(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Cuerpo de la solicitud inválido: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database_driver: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        database_driver: state.database_driver.clone(),
    })
}

async fn complete_analysis_handler(
    State(state): State<SharedState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload?;
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request("La pregunta no puede estar vacía"));
    }
    Ok(Json(state.pipeline.handle(request).await))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(alias = "id_consulta")]
    pub consultation_id: i64,
    pub feedback_value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub id_consulta: i64,
    pub respuesta_util: String,
}

async fn feedback_handler(
    State(state): State<SharedState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let Json(request) = payload?;
    let usefulness = Usefulness::from_feedback(&request.feedback_value).ok_or_else(|| {
        warn!(value = %request.feedback_value, "Invalid feedback value");
        ApiError::bad_request("feedback_value debe ser 'me_gusta' o 'no_me_gusta'")
    })?;

    state
        .consultations
        .set_usefulness(request.consultation_id, usefulness)
        .await
        .map_err(ApiError::from_store)?;

    info!(id_consulta = request.consultation_id, usefulness = usefulness.as_str(), "Feedback recorded");
    Ok(Json(FeedbackResponse {
        id_consulta: request.consultation_id,
        respuesta_util: usefulness.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(alias = "id_consulta")]
    pub consultation_id: i64,
    pub comentario: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id_consulta: i64,
    pub comentario: String,
}

async fn comment_handler(
    State(state): State<SharedState>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<CommentResponse>, ApiError> {
    let Json(request) = payload?;
    let comment = validate_comment(&request.comentario).map_err(|e| ApiError::bad_request(e.to_string()))?;

    state
        .consultations
        .set_comment(request.consultation_id, &comment)
        .await
        .map_err(ApiError::from_store)?;

    info!(id_consulta = request.consultation_id, chars = comment.chars().count(), "Comment recorded");
    Ok(Json(CommentResponse {
        id_consulta: request.consultation_id,
        comentario: comment,
    }))
}
