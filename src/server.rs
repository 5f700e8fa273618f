//! HTTP API server.
//!
//! Exposes retrieval, contract review, and precedent-grounded chat as a JSON
//! API for the web front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | Nearest precedents for a query |
//! | `POST` | `/review` | Structured contract review |
//! | `POST` | `/chat` | Conversational answer grounded in precedents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "분석할 내용이 없습니다." } }
//! ```
//!
//! Error codes: `bad_request` (400, including unreadable JSON bodies),
//! `malformed_response` (502), `generation_failed` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser front end
//! can be served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use clausemate_core::models::RetrievedPrecedent;
use clausemate_core::response::Finding;

use crate::chat::{ChatError, ChatPipeline};
use crate::config::Config;
use crate::review::{DocumentText, ImageInput, ReviewError, ReviewInput, ReviewPipeline};
use crate::search::PrecedentRetriever;
use crate::services::Services;

/// Request bodies carry base64 images, so the default 2 MB limit is raised.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
const MAX_TOP_K: usize = 50;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    retriever: Arc<PrecedentRetriever>,
    review: Arc<ReviewPipeline>,
    chat: Arc<ChatPipeline>,
}

impl AppState {
    /// Share the pipelines already built in `services`.
    pub fn from_services(services: &Services) -> Self {
        Self {
            retriever: services.retriever.clone(),
            review: services.review.clone(),
            chat: services.chat.clone(),
        }
    }
}

/// Build the API router. Tests bind it to an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/review", post(handle_review))
        .route("/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let state = AppState::from_services(&services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    println!("ClauseMate server listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    services.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn rejected(rejection: JsonRejection) -> AppError {
    bad_request(rejection.body_text())
}

fn malformed_response(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "malformed_response",
        message: message.into(),
    }
}

fn generation_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "generation_failed",
        message: message.into(),
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::EmptyInput => bad_request(ReviewError::EmptyInput.to_string()),
            ReviewError::Malformed(e) => {
                error!(error = %e, "review response could not be recovered");
                malformed_response(e.to_string())
            }
            ReviewError::Generation(e) => {
                error!(error = %e, "review generation failed");
                generation_failed(e.to_string())
            }
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyQuestion => bad_request(ChatError::EmptyQuestion.to_string()),
            ChatError::Malformed(e) => malformed_response(e.to_string()),
            ChatError::Generation(e) => {
                error!(error = %e, "chat generation failed");
                generation_failed(e.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievedPrecedent>,
}

/// A blank query is allowed; it retrieves for the fallback query.
async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload.map_err(rejected)?;
    let top_k = req.top_k.unwrap_or(state.retriever.default_top_k());
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(bad_request(format!("top_k must be between 1 and {}", MAX_TOP_K)));
    }
    let results = state.retriever.retrieve(&req.query, top_k).await;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /review ============

#[derive(Deserialize)]
struct DocumentPayload {
    name: String,
    text: String,
}

#[derive(Deserialize)]
struct ImagePayload {
    mime_type: String,
    data_base64: String,
}

#[derive(Deserialize)]
struct ReviewRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    documents: Vec<DocumentPayload>,
    #[serde(default)]
    images: Vec<ImagePayload>,
}

#[derive(Serialize)]
struct ReviewResponse {
    title: String,
    score: u8,
    score_comment: String,
    analysis: Vec<Finding>,
    full_analysis_json: String,
}

impl ReviewRequest {
    fn into_input(self) -> Result<ReviewInput, AppError> {
        let mut images = Vec::with_capacity(self.images.len());
        for (i, image) in self.images.into_iter().enumerate() {
            if !image.mime_type.starts_with("image/") {
                return Err(bad_request(format!(
                    "images[{}]: unsupported mime_type '{}'",
                    i, image.mime_type
                )));
            }
            let data = base64::engine::general_purpose::STANDARD
                .decode(image.data_base64.trim())
                .map_err(|e| bad_request(format!("images[{}]: invalid base64: {}", i, e)))?;
            images.push(ImageInput {
                mime_type: image.mime_type,
                data,
            });
        }

        Ok(ReviewInput {
            text: self.text,
            documents: self
                .documents
                .into_iter()
                .map(|d| DocumentText {
                    name: d.name,
                    text: d.text,
                })
                .collect(),
            images,
        })
    }
}

async fn handle_review(
    State(state): State<AppState>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewResponse>, AppError> {
    let Json(req) = payload.map_err(rejected)?;
    let input = req.into_input()?;
    let outcome = state.review.review(&input).await?;
    Ok(Json(ReviewResponse {
        title: outcome.report.title,
        score: outcome.report.score,
        score_comment: outcome.report.score_comment,
        analysis: outcome.report.analysis,
        full_analysis_json: outcome.raw_json,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(rejected)?;
    let answer = state
        .chat
        .answer(&req.question, req.context.as_deref())
        .await?;
    Ok(Json(ChatResponse { answer }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::DisabledGenerator;
    use crate::sqlite_index::SqliteIndex;
    use crate::testing::{client_for, RecordingProvider};

    #[tokio::test]
    async fn test_state_shares_service_pipelines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path().join("index.sqlite"));
        config.embedding.dims = Some(4);

        let index = Arc::new(SqliteIndex::open(&config).await.unwrap());
        let services = Services::assemble(
            client_for(RecordingProvider::new(4)),
            index,
            Arc::new(DisabledGenerator),
            &config,
        );
        let state = AppState::from_services(&services);

        assert!(Arc::ptr_eq(&state.retriever, &services.retriever));
        assert!(Arc::ptr_eq(&state.review, &services.review));
        assert!(Arc::ptr_eq(&state.chat, &services.chat));
        services.close().await;
    }
}
