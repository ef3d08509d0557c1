//! 테스트용 인메모리 벡터 저장소
//!
//! 전수 코사인 유사도 비교로 검색합니다.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector::{
    cosine_similarity, summarize_documents, DocumentSummary, SearchResult, VectorEntry,
    VectorStore,
};

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 엔트리 복사본
    pub async fn snapshot(&self) -> Vec<VectorEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let entries = self.entries.read().await;

        let mut scored: Vec<SearchResult> = entries
            .iter()
            .map(|e| SearchResult {
                doc_id: e.doc_id.clone(),
                doc_name: e.doc_name.clone(),
                chunk_index: e.chunk_index,
                chunk_text: e.chunk_text.clone(),
                similarity: cosine_similarity(&e.embedding, query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete_by_doc_name(&self, doc_name: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.doc_name != doc_name);
        Ok(before - entries.len())
    }

    async fn delete_by_doc_name_except(&self, doc_name: &str, keep_doc_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.doc_name != doc_name || e.doc_id == keep_doc_id);
        Ok(before - entries.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        let entries = self.entries.read().await;
        Ok(summarize_documents(entries.iter().map(|e| {
            (
                e.doc_id.clone(),
                e.doc_name.clone(),
                e.source.clone(),
                e.added_at.clone(),
            )
        })))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
