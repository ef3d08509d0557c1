//! 웹 서버
//!
//! 업로드/질문/통계 API와 채팅 페이지를 제공합니다.
//! 에러 응답은 `{"detail": "..."}` 형식입니다.

use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::RagError;
use crate::extractor::{DocumentFormat, ExtractError};
use crate::knowledge::DocumentSummary;
use crate::rag::{KnowledgeStats, QueryResult, RagSystem, DEFAULT_N_RESULTS};

/// 업로드 최대 크기 (10 MiB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 내장 채팅 페이지
const INDEX_HTML: &str = include_str!("../../static/index.html");

// ============================================================================
// State & Config
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagSystem>,
    pub page: Arc<str>,
}

impl AppState {
    /// 내장 페이지로 상태 생성
    pub fn new(rag: Arc<RagSystem>) -> Self {
        Self {
            rag,
            page: Arc::from(INDEX_HTML),
        }
    }

    pub fn with_page(mut self, page: impl Into<Arc<str>>) -> Self {
        self.page = page.into();
        self
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 채팅 페이지 템플릿 파일 (없으면 내장 페이지)
    pub template: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            template: None,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/upload", post(upload_document))
        .route("/api/ask", post(ask_question))
        .route("/api/stats", get(stats))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/{name}", delete(delete_document))
        .route("/api/clear", delete(clear))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// 템플릿 파일을 읽거나 내장 페이지 반환
pub fn load_page(template: Option<&FsPath>) -> anyhow::Result<String> {
    match template {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {:?}", path)),
        None => Ok(INDEX_HTML.to_string()),
    }
}

pub async fn run_server(config: ServerConfig, rag: RagSystem) -> anyhow::Result<()> {
    let page = load_page(config.template.as_deref())?;
    let state = AppState::new(Arc::new(rag)).with_page(page);
    let app = app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docqa-rag server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docqa-rag listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    /// 추출기 거부 (잘못된 JSON, 본문 크기 초과 등), 상태 코드는 axum 그대로
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected { status, .. } => *status,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<RagError>() {
            return match e {
                RagError::DocumentNotFound(_) => Self::NotFound(e.to_string()),
                e if e.is_invalid_input() => Self::BadRequest(e.to_string()),
                e => Self::Internal(e.to_string()),
            };
        }

        if let Some(e) = err.downcast_ref::<ExtractError>() {
            return Self::from_extract(e);
        }

        Self::Internal(format!("{:#}", err))
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        Self::from_extract(&err)
    }
}

impl ApiError {
    fn from_extract(err: &ExtractError) -> Self {
        match err {
            ExtractError::NotFound(_) => Self::Internal(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub document_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_chunks: usize,
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.page.to_string())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut document_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                file = Some((filename, data.to_vec()));
            }
            "document_name" => {
                let name = field.text().await?;
                document_name = Some(name);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    if filename.trim().is_empty() {
        return Err(ApiError::BadRequest("No file provided".into()));
    }

    let extension = FsPath::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    if DocumentFormat::from_extension(&extension).is_none() {
        return Err(ExtractError::UnsupportedFormat { extension }.into());
    }

    // 임시 파일은 drop 시 삭제
    let temp = tempfile::Builder::new()
        .prefix("docqa-upload-")
        .suffix(&extension)
        .tempfile()
        .context("Failed to create temp file")?;
    tokio::fs::write(temp.path(), &data)
        .await
        .context("Failed to write uploaded file")?;

    let doc_name = document_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| filename.clone());

    let report = state
        .rag
        .add_document_from(temp.path(), Some(doc_name.as_str()), &filename)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        message: format!(
            "Document '{}' successfully added to knowledge base",
            report.doc_name
        ),
        document_name: report.doc_name,
    }))
}

async fn ask_question(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError> {
    let Json(request) = payload?;
    let result = state.rag.ask(&request.question, request.n_results).await?;
    Ok(Json(result))
}

async fn stats(State(state): State<AppState>) -> Result<Json<KnowledgeStats>, ApiError> {
    Ok(Json(state.rag.stats().await?))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    Ok(Json(state.rag.documents().await?))
}

async fn delete_document(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted_chunks = state.rag.delete_document(&name).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Document '{}' deleted", name),
        deleted_chunks,
    }))
}

async fn clear(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.rag.clear().await?;
    Ok(Json(json!({"success": true, "message": "Knowledge base cleared"})))
}

// ============================================================================
// Tests
// ============================================================================
