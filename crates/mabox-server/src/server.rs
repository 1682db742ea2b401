//! HTTP server for upload and download endpoints
//!
//! Provides /upload, /files/{filename}, /info/{filename} and /health, and
//! refuses direct access to the upload directory.

use crate::error::AppError;
use crate::types::{ApiResponse, FileInfo, HealthResponse, UploadData};
use crate::upload::{discard_staged, read_upload};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use ephemeral_store::{BlobHandle, EphemeralStore, StagedUpload};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

/// Multipart framing on top of the file bytes themselves
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: EphemeralStore,
    pub staging_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(store: EphemeralStore, staging_dir: PathBuf, max_upload_bytes: u64) -> Self {
        Self {
            store,
            staging_dir,
            max_upload_bytes,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router. With `public_path` set, unmatched routes fall
/// through to static files from that directory.
pub fn create_router(state: SharedState, public_path: Option<PathBuf>) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .try_into()
        .unwrap_or(usize::MAX);

    let router = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/files/{filename}", get(download))
        .route("/info/{filename}", get(file_info))
        .route("/uploads", any(forbidden_uploads))
        .route("/uploads/{*path}", any(forbidden_uploads));

    let router = match public_path {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).not_found_service(endpoint_not_found.into_service()),
        ),
        None => router.fallback(endpoint_not_found),
    };

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    router: Router,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let stats = state.store.stats().await;
    let uptime = (Utc::now() - state.started_at).num_milliseconds() as f64 / 1000.0;

    Json(HealthResponse {
        success: true,
        message: "Server is running".to_string(),
        uptime,
        active_files: stats.active_files,
    })
}

/// POST /upload
async fn upload(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<UploadData>>, AppError> {
    let form = read_upload(multipart, &state.staging_dir, state.max_upload_bytes).await?;
    let Some(file) = form.file else {
        return Err(AppError::BadRequest("No file uploaded".into()));
    };

    let staged_path = file.path.clone();
    let upload = StagedUpload {
        staged_path: file.path,
        original_name: file.original_name,
        size_bytes: file.size,
        mime_type: file.mime_type,
        ttl: form.ttl.clone().unwrap_or_default(),
        desired_name: form.file_name,
    };

    match state.store.put(upload).await {
        Ok(stored) => Ok(Json(ApiResponse::ok(
            Some("File uploaded successfully"),
            UploadData::new(stored, form.ttl),
        ))),
        Err(e) => {
            discard_staged(&staged_path).await;
            Err(e.into())
        }
    }
}

/// GET /files/{filename}
/// Streams the blob; a client disconnect drops the stream and closes the file.
async fn download(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let BlobHandle { record, file } = state.store.get(&filename).await?;

    let content_type = HeaderValue::from_str(&record.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&record.original_name),
        )
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, record.size_bytes)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("building download response: {}", e)))
}

/// GET /info/{filename}
async fn file_info(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Json<ApiResponse<FileInfo>>, AppError> {
    let record = state.store.stat(&filename).await?;
    Ok(Json(ApiResponse::ok(None, FileInfo::from(record))))
}

async fn forbidden_uploads() -> AppError {
    AppError::Forbidden(
        "Direct access to uploads folder is forbidden. Use /files/{filename} endpoint instead."
            .into(),
    )
}

async fn endpoint_not_found() -> AppError {
    AppError::NotFound("Endpoint not found".into())
}

/// `attachment; filename="..."`, adding an RFC 5987 `filename*` when the
/// name is not plain ASCII
fn content_disposition(original_name: &str) -> HeaderValue {
    let quotable = |c: char| (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\';

    let value = if original_name.chars().all(quotable) {
        format!("attachment; filename=\"{}\"", original_name)
    } else {
        let fallback: String = original_name
            .chars()
            .map(|c| if quotable(c) { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(original_name)
        )
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
