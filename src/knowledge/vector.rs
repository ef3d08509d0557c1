//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 청크는 문서 ID/이름 태그와 함께 저장됩니다.
//! 문서는 별도 저장소 없이 청크 메타데이터로만 존재합니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID (`{doc_id}_{chunk_index}`)
    pub chunk_id: String,
    /// 문서 ID
    pub doc_id: String,
    /// 문서 이름
    pub doc_name: String,
    /// 원본 경로 또는 출처
    pub source: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 수집 시각 (RFC3339)
    pub added_at: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// 청크 ID 생성 규칙
    pub fn make_chunk_id(doc_id: &str, chunk_index: i32) -> String {
        format!("{}_{}", doc_id, chunk_index)
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 문서 ID
    pub doc_id: String,
    /// 문서 이름
    pub doc_name: String,
    /// 청크 인덱스
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 유사도 스코어 (1 - 코사인 거리)
    pub similarity: f32,
}

/// 문서 요약 (청크 메타데이터를 묶은 결과)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub doc_name: String,
    pub source: String,
    pub chunk_count: usize,
    pub added_at: String,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 문서 이름으로 청크 삭제
    async fn delete_by_doc_name(&self, doc_name: &str) -> Result<usize>;

    /// 같은 이름의 청크 중 `keep_doc_id`가 아닌 것만 삭제 (문서 교체용)
    async fn delete_by_doc_name_except(&self, doc_name: &str, keep_doc_id: &str) -> Result<usize>;

    /// 청크 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 문서 목록 (이름순)
    async fn documents(&self) -> Result<Vec<DocumentSummary>>;

    /// 전체 삭제
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 청크 메타데이터를 문서 단위로 묶기
///
/// `(doc_id, doc_name, source, added_at)` 행 목록에서 문서별 청크 수를 집계합니다.
pub fn summarize_documents<I>(rows: I) -> Vec<DocumentSummary>
where
    I: IntoIterator<Item = (String, String, String, String)>,
{
    let mut by_id: std::collections::HashMap<String, DocumentSummary> =
        std::collections::HashMap::new();

    for (doc_id, doc_name, source, added_at) in rows {
        by_id
            .entry(doc_id.clone())
            .and_modify(|d| d.chunk_count += 1)
            .or_insert(DocumentSummary {
                doc_id,
                doc_name,
                source,
                chunk_count: 1,
                added_at,
            });
    }

    let mut docs: Vec<DocumentSummary> = by_id.into_values().collect();
    docs.sort_by(|a, b| a.doc_name.cmp(&b.doc_name).then(a.doc_id.cmp(&b.doc_id)));
    docs
}

// ============================================================================
// Tests
// ============================================================================
