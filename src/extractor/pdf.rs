//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use super::ExtractError;

/// PDF에서 텍스트 추출
///
/// 페이지 구분(폼피드)은 줄바꿈으로 바꿉니다. 텍스트가 없으면 스캔 문서로 보고 에러입니다.
pub fn extract_text_from_pdf(path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Failed {
        path: path.display().to_string(),
        message: format!("error reading PDF: {}", e),
    })?;

    let text = normalize_pages(&text);

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Err(ExtractError::EmptyPdf);
    }

    Ok(text)
}

/// 페이지별 텍스트를 하나로 합치기
fn normalize_pages(text: &str) -> String {
    text.split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
