//! HTTP front end for the groundwater assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question from records and ingested documents |
//! | `POST` | `/ingest` | Upload a document (multipart field `file`) |
//! | `GET`  | `/documents` | List ingested documents |
//! | `GET`  | `/health` | Status, version, and engine state |
//!
//! # Error Contract
//!
//! Every error response has the same shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `payload_too_large` (413),
//! `ingestion_failed` (422), `retrieval_failed` (500), `generation_failed` (500),
//! `internal` (500), `engine_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser chat
//! widget can be served from anywhere.

use anyhow::bail;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use ingres_rag_core::models::{ChatRequest, ChatResponse, IndexedDocument, IngestReceipt};

use crate::app::App;
use crate::config::Config;
use crate::error::{IngestError, ServiceError};

/// Multipart field carrying the uploaded document. `pdf` is accepted too.
const UPLOAD_FIELDS: [&str; 2] = ["file", "pdf"];

/// Slack on top of `max_upload_bytes` for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const GREETINGS: [&str; 6] = [
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];

const GREETING_REPLY: &str = "Hello, I'm the INGRES assistant. Ask me about groundwater \
    levels and water quality in your district, or upload a report (PDF) for me to search.";

/// Starts the server with the configured model.
///
/// The model loads in the background while the server already accepts
/// requests (chat answers 503 until it is ready). A failed load is fatal:
/// the server stops and the error is returned.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::open_with_model(config)?;
    run_server_with_app(app).await
}

/// Serves an already built [`App`] on `[server].bind`.
pub async fn run_server_with_app(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let engine = std::sync::Arc::clone(app.engine());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "ingres server listening");

    let router = build_router(app);
    let server = async move { axum::serve(listener, router).await };

    tokio::select! {
        res = server => res?,
        Err(e) = engine.wait_ready() => {
            tracing::error!(error = %e, "model failed to load, shutting down");
            bail!("{}", e);
        }
    }

    Ok(())
}

/// Builds the router with all routes and layers.
pub fn build_router(app: App) -> Router {
    let body_limit = app
        .config
        .ingest
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/ingest", post(handle_ingest))
        .route("/documents", get(handle_documents))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app)
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
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
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            IngestError::Storage(_) => internal(message),
            _ => AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "ingestion_failed", message),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::EmptyQuestion => bad_request(message),
            ServiceError::Ingestion(e) => e.into(),
            ServiceError::Retrieval(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "retrieval_failed", message)
            }
            ServiceError::EngineUnavailable(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable", message)
            }
            ServiceError::Generation(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "generation_failed", message)
            }
        }
    }
}

// ============ POST /chat ============

/// Whether `text` is, or opens with, a plain greeting.
pub fn is_greeting(text: &str) -> bool {
    let s = text.trim().to_lowercase();
    GREETINGS.iter().any(|g| {
        s == *g || s.starts_with(&format!("{} ", g)) || s.contains(&format!(" {} ", g))
    })
}

async fn handle_chat(
    State(app): State<App>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    if app.config.server.greetings && is_greeting(&request.question) {
        tracing::debug!("greeting short-circuit");
        return Ok(Json(ChatResponse {
            reply: GREETING_REPLY.to_string(),
            context_used: String::new(),
        }));
    }

    let response = app.chat.chat(&request).await.map_err(|e| {
        tracing::warn!(error = %e, "chat failed");
        AppError::from(e)
    })?;
    Ok(Json(response))
}

// ============ POST /ingest ============

async fn handle_ingest(
    State(app): State<App>,
    mut multipart: Multipart,
) -> Result<Json<IngestReceipt>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let is_upload = field
            .name()
            .map(|n| UPLOAD_FIELDS.contains(&n))
            .unwrap_or(false);
        if !is_upload {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let receipt = app.ingest.ingest(bytes.to_vec(), &filename).await.map_err(|e| {
            tracing::warn!(filename = %filename, error = %e, "ingestion failed");
            AppError::from(e)
        })?;
        return Ok(Json(receipt));
    }

    Err(bad_request("multipart field 'file' is required"))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<IndexedDocument>,
}

async fn handle_documents(State(app): State<App>) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = app.index.list().map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(DocumentListResponse { documents }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// `loading`, `ready`, `failed`, or `stopped`.
    engine: String,
}

async fn handle_health(State(app): State<App>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: app.engine().state().as_str().to_string(),
    })
}
