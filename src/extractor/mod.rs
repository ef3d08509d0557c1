//! 콘텐츠 추출 모듈
//!
//! 업로드/수집된 파일에서 텍스트를 추출합니다.
//! - 텍스트/마크다운: 직접 읽기 (UTF-8, 실패 시 CP1251, 그다음 Latin-1)
//! - PDF: pdf-extract
//! - DOCX/XLSX/XLS: [`office`] 참고
//! - HTML: scraper로 본문 텍스트만 추출
//! - CSV: 행 단위 `a | b | c` 텍스트
//! - JSON: 보기 좋게 재직렬화

pub mod html;
pub mod office;
pub mod pdf;

use std::path::Path;

use encoding_rs::WINDOWS_1251;
use thiserror::Error;

// ============================================================================
// Document Format
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Html,
    Csv,
    Json,
    Docx,
    Excel,
}

/// 지원 확장자 목록 (점 포함, 안내 메시지용)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".pdf", ".docx", ".html", ".htm", ".csv", ".xlsx", ".xls", ".json",
];

impl DocumentFormat {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            "html" | "htm" => Some(Self::Html),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "docx" => Some(Self::Docx),
            "xlsx" | "xls" => Some(Self::Excel),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// 추출 에러
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file format: {extension}. Supported: {}", SUPPORTED_EXTENSIONS.join(", "))]
    UnsupportedFormat { extension: String },

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("no text could be extracted from PDF")]
    EmptyPdf,

    #[error("error processing file {path}: {message}")]
    Failed { path: String, message: String },
}

impl ExtractError {
    fn failed(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Failed {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 파일에서 텍스트 추출
///
/// PDF와 오피스 문서 파싱은 CPU 바운드이므로 blocking 스레드에서 실행합니다.
pub async fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| ExtractError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default(),
    })?;

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::failed(path, e))?;

    match format {
        DocumentFormat::Pdf => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned, &bytes))
                .await
                .map_err(|e| ExtractError::failed(path, e))?
        }
        DocumentFormat::Docx | DocumentFormat::Excel => {
            tokio::task::spawn_blocking(move || extract_from_bytes(format, &bytes))
                .await
                .map_err(|e| ExtractError::failed(path, e))?
                .map_err(|e| ExtractError::failed(path, format!("{:#}", e)))
        }
        _ => extract_from_bytes(format, &bytes).map_err(|e| ExtractError::failed(path, e)),
    }
}

/// PDF 외 형식의 메모리 내 추출
fn extract_from_bytes(format: DocumentFormat, bytes: &[u8]) -> anyhow::Result<String> {
    match format {
        DocumentFormat::Text | DocumentFormat::Markdown => Ok(decode_text(bytes)),
        DocumentFormat::Html => Ok(html::extract_text_from_html(&decode_text(bytes))),
        DocumentFormat::Csv => extract_csv(bytes),
        DocumentFormat::Json => extract_json(bytes),
        DocumentFormat::Docx => office::extract_docx(bytes),
        DocumentFormat::Excel => office::extract_excel(bytes),
        DocumentFormat::Pdf => anyhow::bail!("PDF must be extracted from a file"),
    }
}

/// 바이트를 텍스트로 디코딩 (UTF-8 → CP1251 → Latin-1)
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some(text) = WINDOWS_1251.decode_without_bom_handling_and_without_replacement(bytes) {
        tracing::debug!("Input is not valid UTF-8, decoded as CP1251");
        return text.into_owned();
    }

    tracing::debug!("Input is not valid UTF-8 or CP1251, decoding as Latin-1");
    bytes.iter().map(|&b| b as char).collect()
}

/// CSV를 `헤더 | 값` 형태의 줄 텍스트로 변환
fn extract_csv(bytes: &[u8]) -> anyhow::Result<String> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record
            .iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if !cells.is_empty() {
            lines.push(cells.join(" | "));
        }
    }

    Ok(lines.join("\n"))
}

/// JSON을 들여쓰기 된 텍스트로 변환
fn extract_json(bytes: &[u8]) -> anyhow::Result<String> {
    let value: serde_json::Value = serde_json::from_str(&decode_text(bytes))?;
    Ok(serde_json::to_string_pretty(&value)?)
}

// ============================================================================
// Tests
// ============================================================================
