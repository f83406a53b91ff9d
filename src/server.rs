//! HTTP surface: multipart PDF upload in, JSON quiz out.
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/api/pdf/process` | multipart, field `file` | the shape's JSON object |
//! | `POST` | `/process-pdf` | same | same |
//! | `GET`  | `/health` | – | `{"status": "ok", …}` |
//!
//! Errors are returned as `{"detail": "<message>"}` with:
//!
//! | Error | Status |
//! |-------|--------|
//! | missing `file` field, bad multipart, non-`.pdf` name, bad signature | 400 |
//! | unreadable PDF, no extractable text | 422 |
//! | request deadline exceeded | 504 |
//! | everything else (all segments failed, backend misconfigured, …) | 500 |
//!
//! CORS is fully permissive so a browser frontend on another origin can
//! call the service directly.

use crate::error::QuizError;
use crate::process::Processor;
use crate::schema::FinalResult;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Default upload limit: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

#[derive(Clone)]
struct AppState {
    processor: Arc<Processor>,
}

/// Build the router. Exposed separately from [`serve`] so tests can drive
/// it in-process.
pub fn router(processor: Arc<Processor>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/pdf/process", post(process_pdf))
        .route("/process-pdf", post(process_pdf))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(AppState { processor })
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(
    addr: SocketAddr,
    processor: Arc<Processor>,
    max_upload_bytes: usize,
) -> Result<(), QuizError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| QuizError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(processor, max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuizError::Internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "backend": state.processor.backend_name(),
        "shape": state.processor.config().shape,
    }))
}

async fn process_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FinalResult>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::bad_request(format!("Missing '{FILE_FIELD}' field")))?;

    let output = state
        .processor
        .process_upload(&filename, bytes.to_vec())
        .await?;

    info!(
        "'{}': {}/{} segments, {} attempts, {} in / {} out tokens, {}ms{}",
        filename,
        output.stats.succeeded_segments,
        output.stats.total_segments,
        output.stats.total_attempts,
        output.stats.input_tokens,
        output.stats.output_tokens,
        output.stats.total_duration_ms,
        if output.stats.cache_hit { " (cached)" } else { "" }
    );

    Ok(Json(output.result))
}

// ── Errors ───────────────────────────────────────────────────────────────

/// An error rendered as `{"detail": …}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail,
        }
    }
}

/// HTTP status for a fatal processing error.
pub fn status_for(err: &QuizError) -> StatusCode {
    match err {
        QuizError::UnsupportedFileType { .. } | QuizError::NotAPdf { .. } => {
            StatusCode::BAD_REQUEST
        }
        QuizError::CorruptPdf { .. } | QuizError::NoExtractableText { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        QuizError::RequestTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), err);
        }
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
