//! HTTP API for search and RAG context assembly.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and embedding model) |
//! | `POST` | `/search` | Ranked results, search stats and insights |
//! | `POST` | `/rag/query` | Budgeted context, sources and compression stats |
//!
//! `/rag/query` never generates an answer; the caller feeds `context` to
//! its own model. Both search endpoints accept `"direct": true` to bypass
//! the cache.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_unavailable` (503),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use recall_core::models::ContentType;

use crate::engine::{
    RagQuery, RagResponse, RetrievalDefaults, SearchEngine, SearchOutcome, SearchRequest,
};
use crate::error::RecallError;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<SearchEngine>,
}

/// Build the router. Exposed separately from [`run_server`] so handlers can
/// be exercised without binding a socket.
pub fn router(engine: Arc<SearchEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/rag/query", post(handle_rag_query))
        .layer(cors)
        .with_state(AppState { engine })
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(engine: Arc<SearchEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("recall server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
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
#[derive(Debug)]
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

impl From<RecallError> for AppError {
    fn from(err: RecallError) -> Self {
        match err {
            RecallError::Configuration(message) => bad_request(message),
            e @ RecallError::EmbeddingUnavailable(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "embedding_unavailable",
                message: e.to_string(),
            },
            other => {
                tracing::error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    embedding_model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        embedding_model: state.engine.provider().model_name().to_string(),
    })
}

// ============ POST /search ============

/// Omitted `threshold` and `limit` fall back to `[retrieval]` in the
/// engine's configuration.
#[derive(Deserialize)]
struct SearchBody {
    query: String,
    #[serde(alias = "user_id")]
    owner_id: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    content_types: Option<Vec<ContentType>>,
    #[serde(default)]
    max_age_days: Option<u32>,
    #[serde(default)]
    threshold: Option<f32>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    direct: bool,
}

impl SearchBody {
    fn into_request(self, defaults: &RetrievalDefaults) -> SearchRequest {
        let mut request = SearchRequest::with_defaults(self.query, self.owner_id, defaults);
        request.project_id = self.project_id;
        request.content_types = self.content_types;
        request.max_age_days = self.max_age_days;
        request.threshold = self.threshold.unwrap_or(defaults.threshold);
        request.limit = self.limit.unwrap_or(defaults.limit);
        request
    }
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchOutcome>, AppError> {
    let Json(body) = body?;
    let direct = body.direct;
    let request = body.into_request(&state.engine.settings().retrieval);
    let outcome = if direct {
        state.engine.search_direct(&request).await?
    } else {
        state.engine.search(&request).await?
    };
    Ok(Json(outcome))
}

// ============ POST /rag/query ============

#[derive(Deserialize)]
struct RagBody {
    question: String,
    #[serde(alias = "user_id")]
    owner_id: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    max_tokens: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    include_types: Option<Vec<ContentType>>,
    #[serde(default)]
    max_age_days: Option<u32>,
    #[serde(default)]
    direct: bool,
}

impl RagBody {
    fn into_query(self, defaults: &RetrievalDefaults) -> RagQuery {
        let mut query = RagQuery::with_defaults(self.question, self.owner_id, defaults);
        query.project_id = self.project_id;
        query.max_tokens = self.max_tokens.unwrap_or(defaults.max_tokens);
        query.threshold = self.threshold.unwrap_or(defaults.threshold);
        query.limit = self.limit.unwrap_or(defaults.limit);
        query.include_types = self.include_types;
        query.max_age_days = self.max_age_days;
        query.direct = self.direct;
        query
    }
}

async fn handle_rag_query(
    State(state): State<AppState>,
    body: Result<Json<RagBody>, JsonRejection>,
) -> Result<Json<RagResponse>, AppError> {
    let Json(body) = body?;
    let query = body.into_query(&state.engine.settings().retrieval);
    let response = state.engine.query(&query, None).await?;
    Ok(Json(response))
}
