//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload` | Multipart upload, one or more `files` fields |
//! | `POST` | `/api/chat` | `{message}` → `{response, source_documents}` |
//! | `POST` | `/api/ask` | `{message}` → full query result with previews |
//! | `GET`  | `/api/status` | Document count, names, readiness |
//! | `DELETE` | `/api/reset` | Drop every document in the session |
//! | `GET`  | `/api/documents` | Registered documents with ids |
//! | `GET`  | `/api/documents/stats` | Registry totals plus index status |
//! | `DELETE` | `/api/documents/{id}` | Delete one document and rebuild |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Sessions
//!
//! Each client is tied to a session by the `ragbot_session` cookie. A
//! request without one is given a fresh id and a `Set-Cookie` header.
//! Non-browser clients can send `x-session-id` instead, which wins over
//! the cookie. Ids are up to 128 ASCII letters, digits or `-`; anything
//! else is ignored.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "No documents uploaded yet. Please upload PDF documents first." } }
//! ```
//!
//! Error codes: `bad_request` (400), `extraction_failed` (400),
//! `not_ready` (400), `not_found` (404), `index_build_failed` (500),
//! `embedding_failed` (502), `generation_failed` (502).

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Extension, Multipart, Path, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use ragbot_core::models::{DocumentRecord, QueryResult};
use ragbot_core::{ErrorKind, RagError};

use crate::config::Config;
use crate::service::{
    DeleteSummary, DocumentStatsSummary, RagService, ResetSummary, StatusSummary, UploadFile,
    UploadSummary,
};

pub const SESSION_COOKIE: &str = "ragbot_session";
pub const SESSION_HEADER: &str = "x-session-id";
pub const MAX_SESSION_ID_LEN: usize = 128;
/// Multipart field name carrying uploaded files.
pub const UPLOAD_FIELD: &str = "files";

/// Session id resolved for the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Start the server on `[server].bind` and run until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(RagService::from_config(config)?);
    let app = router(service, config.upload.max_request_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "ragbot listening");
    println!("ragbot listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

/// Build the router. Exposed for in-process tests.
pub fn router(service: Arc<RagService>, max_request_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/ask", post(handle_ask))
        .route("/status", get(handle_status))
        .route("/reset", delete(handle_reset))
        .route("/documents", get(handle_list_documents))
        .route("/documents/stats", get(handle_document_stats))
        .route("/documents/{id}", delete(handle_delete_document))
        .layer(middleware::from_fn(resolve_session));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(cors)
        .with_state(service)
}

// ============ Sessions ============

/// Pick the session id from the header or cookie, minting one if absent.
async fn resolve_session(mut req: Request, next: Next) -> Response {
    let (id, minted) = match session_from_headers(req.headers()) {
        Some(id) => (id, false),
        None => (ragbot_core::session::SessionManager::new_session_id(), true),
    };
    req.extensions_mut().insert(SessionId(id.clone()));

    let mut response = next.run(req).await;
    if minted {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| is_valid_session_id(v))
    {
        return Some(id.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && is_valid_session_id(value))
        .map(|(_, value)| value.to_string())
}

/// Non-empty, at most [`MAX_SESSION_ID_LEN`] ASCII letters, digits or `-`.
/// Anything else is ignored and the client gets a fresh id.
fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::Extraction => (StatusCode::BAD_REQUEST, "extraction_failed"),
            ErrorKind::NotReady => (StatusCode::BAD_REQUEST, "not_ready"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::IndexBuild => (StatusCode::INTERNAL_SERVER_ERROR, "index_build_failed"),
            ErrorKind::Embedding => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            ErrorKind::Generation => (StatusCode::BAD_GATEWAY, "generation_failed"),
        };
        if !err.is_client_error() {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/upload ============

async fn handle_upload(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read {}: {}", filename, e)))?;
        files.push(UploadFile::new(filename, bytes.to_vec()));
    }

    Ok(Json(service.upload(&session, files).await?))
}

// ============ POST /api/chat, /api/ask ============

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub source_documents: Vec<String>,
}

async fn handle_chat(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
    body: Result<Json<ChatMessage>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(msg) = body.map_err(|e| bad_request(e.body_text()))?;
    let result = service.ask(&session, &msg.message).await?;
    Ok(Json(ChatResponse {
        response: result.answer,
        source_documents: result.sources,
    }))
}

async fn handle_ask(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
    body: Result<Json<ChatMessage>, JsonRejection>,
) -> Result<Json<QueryResult>, AppError> {
    let Json(msg) = body.map_err(|e| bad_request(e.body_text()))?;
    Ok(Json(service.ask(&session, &msg.message).await?))
}

// ============ Status and documents ============

async fn handle_status(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
) -> Json<StatusSummary> {
    Json(service.status(&session))
}

async fn handle_reset(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
) -> Json<ResetSummary> {
    Json(service.reset(&session).await)
}

async fn handle_list_documents(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
) -> Json<Vec<DocumentRecord>> {
    Json(service.list_documents(&session))
}

async fn handle_document_stats(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
) -> Json<DocumentStatsSummary> {
    Json(service.document_stats(&session))
}

async fn handle_delete_document(
    State(service): State<Arc<RagService>>,
    Extension(SessionId(session)): Extension<SessionId>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<DeleteSummary>, AppError> {
    let Path(id) = id.map_err(|e| bad_request(e.body_text()))?;
    Ok(Json(service.delete_document(&session, id).await?))
}
