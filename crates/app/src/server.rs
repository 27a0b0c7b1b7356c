//! JSON HTTP API over the same clients the CLI uses.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/api/sync` | `{ "folderId": "" }` |
//! | `GET`  | `/api/preview/{file_id}` | |
//! | `POST` | `/api/chat` | `{ "message": "...", "history": [...] }` |
//! | `POST` | `/api/analyze` | `{ "items": ["a.pdf", "https://..."], "remediate": false }` |
//! | `POST` | `/api/crawl` | `{ "url": "https://...", "maxPdfs": 50 }` |
//! | `GET`  | `/health` | |
//!
//! Every response carries `success`. Failures are `{ "success": false,
//! "error": "..." }` with 400 for rejected input and 500 for everything else.

use crate::Services;
use accessdoc_core::{
    answer, ChatMessage, ComplianceAnalyzer, CrawlConfig, CrawlError, HttpFetcher, IngestError,
    PdfCrawler, ServiceError,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

type AppState = Arc<Services>;

pub async fn run(services: Services, addr: &str) -> anyhow::Result<()> {
    let app = router(Arc::new(services));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sync", post(handle_sync))
        .route("/api/preview/{file_id}", get(handle_preview))
        .route("/api/chat", post(handle_chat))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/crawl", post(handle_crawl))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
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

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Request(_) => Self::bad_request(error.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Validation(_)
            | IngestError::InvalidArgument(_)
            | IngestError::InvalidChunkConfig(_) => Self::bad_request(error.to_string()),
            IngestError::Service(inner) => inner.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<CrawlError> for AppError {
    fn from(error: CrawlError) -> Self {
        match error {
            CrawlError::InvalidUrl(_) => Self::bad_request(error.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

type ApiResult = Result<Json<Value>, AppError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    #[serde(default)]
    folder_id: String,
}

async fn handle_sync(
    State(services): State<AppState>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let summary = services
        .ingestor()
        .sync_folder(&services.source, &request.folder_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": summary.message(),
        "totalFiles": summary.total_files,
        "totalChunks": summary.total_chunks,
        "processedFiles": summary.processed_files,
        "failedFileDetails": summary.failed_file_details,
    })))
}

async fn handle_preview(
    State(services): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult {
    let document = services.retrieval().reconstruct(&file_id).await?;
    if document.chunk_count == 0 {
        return Err(AppError {
            status: StatusCode::NOT_FOUND,
            message: format!("no indexed chunks for file {file_id}"),
        });
    }

    Ok(Json(json!({
        "success": true,
        "fileId": document.file_id,
        "title": document.title,
        "chunkCount": document.chunk_count,
        "text": document.text,
    })))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

async fn handle_chat(
    State(services): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    if request.message.trim().is_empty() {
        return Err(AppError::bad_request("message is required"));
    }

    let model = services.chat_model()?;
    let history: Vec<ChatMessage> = request
        .history
        .into_iter()
        .filter(|turn| !turn.content.trim().is_empty())
        .collect();
    let reply = answer(&services.retrieval(), model, &request.message, &history).await?;

    Ok(Json(json!({
        "success": true,
        "reply": reply.reply,
        "sources": reply.sources,
        "confidence": reply.confidence,
    })))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    remediate: bool,
}

async fn handle_analyze(
    State(services): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let model = services.chat_model()?;
    let results = ComplianceAnalyzer::new(model, services.source.root())?
        .with_remediation(request.remediate)
        .analyze(&request.items)
        .await?;

    Ok(Json(json!({ "success": true, "results": results })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest {
    #[serde(default)]
    url: String,
    max_pdfs: Option<usize>,
}

async fn handle_crawl(payload: Result<Json<CrawlRequest>, JsonRejection>) -> ApiResult {
    let Json(request) = payload?;
    if request.url.trim().is_empty() {
        return Err(AppError::bad_request("url is required"));
    }

    let mut config = CrawlConfig::default();
    if let Some(max_pdfs) = request.max_pdfs {
        if max_pdfs == 0 {
            return Err(AppError::bad_request("maxPdfs must be positive"));
        }
        config.max_pdfs = max_pdfs;
    }

    let fetcher = HttpFetcher::new(&config)?;
    let pdfs = PdfCrawler::new(config, &fetcher).crawl(&request.url).await?;

    Ok(Json(json!({
        "success": true,
        "count": pdfs.len(),
        "pdfs": pdfs,
    })))
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "success": true, "version": env!("CARGO_PKG_VERSION") }))
}
