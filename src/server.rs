// 🌐 Server - REST API over the merge engine and the session store
//
// Routes are built by `router()` so the binary and the tests share them.

use crate::db::{self, FileSlot, StoredFile};
use crate::export::{to_csv_string, ExportFormat};
use crate::merge::{MergeEngine, MergeStats};
use crate::parser::FileType;
use crate::record::Record;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Catalog exports run to tens of MB as JSON.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("session database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

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

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        } else {
            warn!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn parse_slot(raw: &str) -> Result<FileSlot, ApiError> {
    raw.parse::<FileSlot>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub de: Vec<Record>,
    #[serde(default)]
    pub product: Vec<Record>,
    #[serde(default)]
    pub barcode: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub records: Vec<Record>,
    pub stats: MergeStats,
    pub merged_at: DateTime<Utc>,
    /// False when no DE file is stored to attach the result to
    pub saved: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub content: Vec<Record>,
}

/// Stored file without its content
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub size: u64,
    pub rows: usize,
    pub has_merged_data: bool,
    pub content_hash: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl From<&StoredFile> for FileSummary {
    fn from(file: &StoredFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            file_type: file.file_type.clone(),
            size: file.size,
            rows: file.row_count(),
            has_merged_data: file.merged_data.is_some(),
            content_hash: file.content_hash.clone(),
            saved_at: file.saved_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/merge - Merge the posted sources and keep the result
async fn merge_sources(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<MergeResponse> {
    let report = MergeEngine::new().merge(&request.de, &request.product, &request.barcode);

    let conn = state.conn()?;
    let saved = db::save_merged(&conn, &report.records)?;
    info!(rows = report.records.len(), saved, "merge via API");

    Ok(Json(ApiResponse::ok(MergeResponse {
        records: report.records,
        stats: report.stats,
        merged_at: report.merged_at,
        saved,
    })))
}

fn stored_merge(state: &AppState) -> Result<Vec<Record>, ApiError> {
    let conn = state.conn()?;
    db::load_merged(&conn)?.ok_or_else(|| ApiError::not_found("No merged data"))
}

/// GET /api/merged - Last merged rows
async fn get_merged(State(state): State<AppState>) -> ApiResult<Vec<Record>> {
    Ok(Json(ApiResponse::ok(stored_merge(&state)?)))
}

/// GET /api/merged.csv - Last merged rows as a CSV download
async fn download_merged_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let records = stored_merge(&state)?;
    let csv = to_csv_string(&records).map_err(|e| ApiError::internal(e.to_string()))?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        ExportFormat::Csv.default_file_name()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// PUT /api/files/:slot - Store an uploaded file's parsed rows
async fn put_file(
    State(state): State<AppState>,
    Path(slot): Path<String>,
    Json(upload): Json<UploadRequest>,
) -> ApiResult<FileSummary> {
    let slot = parse_slot(&slot)?;
    let file_type = FileType::from_path(std::path::Path::new(&upload.name))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let file = StoredFile::new(slot, &upload.name, file_type.as_str(), upload.size)
        .with_content(upload.content);

    let conn = state.conn()?;
    db::save_file(&conn, &file)?;

    Ok(Json(ApiResponse::ok(FileSummary::from(&file))))
}

/// GET /api/files/:slot - Stored file with content
async fn get_stored_file(
    State(state): State<AppState>,
    Path(slot): Path<String>,
) -> ApiResult<StoredFile> {
    let slot = parse_slot(&slot)?;
    let conn = state.conn()?;

    match db::get_file(&conn, slot)? {
        Some(file) => Ok(Json(ApiResponse::ok(file))),
        None => Err(ApiError::not_found(format!("No file stored for {}", slot.id()))),
    }
}

/// DELETE /api/files/:slot
async fn delete_stored_file(
    State(state): State<AppState>,
    Path(slot): Path<String>,
) -> ApiResult<DeleteResponse> {
    let slot = parse_slot(&slot)?;
    let conn = state.conn()?;
    let deleted = usize::from(db::delete_file(&conn, slot)?);

    Ok(Json(ApiResponse::ok(DeleteResponse { deleted })))
}

/// DELETE /api/session - Forget every stored file
async fn clear_session(State(state): State<AppState>) -> ApiResult<DeleteResponse> {
    let conn = state.conn()?;
    let deleted = db::clear_session(&conn)?;

    Ok(Json(ApiResponse::ok(DeleteResponse { deleted })))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/merge", post(merge_sources))
        .route("/merged", get(get_merged))
        .route("/merged.csv", get(download_merged_csv))
        .route(
            "/files/:slot",
            get(get_stored_file).put(put_file).delete(delete_stored_file),
        )
        .route("/session", delete(clear_session))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!(%addr, "server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
