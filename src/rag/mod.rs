//! 문서 질의응답 파이프라인
//!
//! 수집(추출 → 청킹 → 임베딩 → 저장)과 질의(임베딩 → 검색 → 컨텍스트 → 답변 생성)를
//! 하나로 묶습니다. 구성 요소는 모두 트레이트 객체라서 테스트에서 교체할 수 있습니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{CachedEmbedding, EmbeddingCache, EmbeddingProvider, VoyageEmbedding};
use crate::error::RagError;
use crate::extractor;
use crate::knowledge::{
    word_chunker, Chunker, DocumentSummary, LanceVectorStore, SearchResult, VectorEntry,
    VectorStore,
};
use crate::llm::{GeminiLlm, LlmProvider};

/// 검색 결과가 없을 때의 답변
pub const NO_RESULTS_ANSWER: &str = "Sorry, no relevant information found in the knowledge base.";

/// 기본 검색 청크 수
pub const DEFAULT_N_RESULTS: usize = 3;

// ============================================================================
// Result Types
// ============================================================================

/// 문서 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub doc_name: String,
    /// 청킹으로 생성된 청크 수
    pub chunks_total: usize,
    /// 임베딩에 성공해 저장된 청크 수
    pub chunks_stored: usize,
    /// 같은 이름의 이전 문서에서 교체된 청크 수
    pub replaced_chunks: usize,
}

impl IngestReport {
    pub fn skipped_chunks(&self) -> usize {
        self.chunks_total - self.chunks_stored
    }
}

/// 답변 근거 청크
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceChunk {
    pub document: String,
    pub chunk_index: i32,
    pub text: String,
    /// 코사인 유사도 (소수 셋째 자리 반올림)
    pub similarity: f32,
}

/// 질의 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    pub chunks_used: usize,
    /// 처리 시간 (초, 소수 둘째 자리 반올림)
    pub processing_time: f64,
}

/// 지식 베이스 통계
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub documents: Vec<String>,
}

// ============================================================================
// RagSystem
// ============================================================================

/// 문서 질의응답 시스템
pub struct RagSystem {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    chunker: Box<dyn Chunker>,
    /// 같은 이름 문서의 교체(삽입 + 이전 세대 삭제)를 직렬화
    write_lock: Mutex<()>,
}

impl RagSystem {
    /// 구성 요소로 직접 생성
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            chunker,
            write_lock: Mutex::new(()),
        }
    }

    /// 설정으로 Voyage + LanceDB + Gemini 구성
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let voyage = VoyageEmbedding::new(config.voyage_key()?, &config.voyage_model)?
            .with_rate_limit(config.embed_rpm);
        let cache = EmbeddingCache::open(&config.cache_dir, &config.voyage_model)?;
        let embedder = CachedEmbedding::new(voyage, cache);

        let store = LanceVectorStore::open(&config.db_path)
            .await
            .context("Failed to open vector database")?;

        let llm = GeminiLlm::new(config.gemini_key()?, &config.gemini_model)?;
        let chunker = word_chunker(config.chunk.clone())?;

        let system = Self::new(Arc::new(embedder), Arc::new(store), Arc::new(llm), chunker);

        let chunks = system.store.count().await?;
        tracing::info!(
            "Database initialized: {:?} ({} chunks)",
            config.db_path,
            chunks
        );
        tracing::info!("Pipeline: {}", system.describe());

        Ok(system)
    }

    /// 구성 요소 이름 요약 (`embedder=..., llm=..., chunker=...`)
    pub fn describe(&self) -> String {
        format!(
            "embedder={}, llm={}, chunker={}",
            self.embedder.name(),
            self.llm.name(),
            self.chunker.name()
        )
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 파일을 지식 베이스에 추가
    ///
    /// `name`이 없으면 파일 이름을 문서 이름으로 사용합니다.
    pub async fn add_document(&self, path: &Path, name: Option<&str>) -> Result<IngestReport> {
        let source = path.display().to_string();
        self.add_document_from(path, name, &source).await
    }

    /// 파일을 추가하되 출처를 따로 지정 (업로드 임시 파일 등)
    pub async fn add_document_from(
        &self,
        path: &Path,
        name: Option<&str>,
        source: &str,
    ) -> Result<IngestReport> {
        let doc_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or(RagError::EmptyDocumentName)?
                .to_string(),
        };

        tracing::info!("Processing document: {} ({:?})", doc_name, path);
        let text = extractor::extract_text(path).await?;

        self.add_text(&doc_name, source, &text).await
    }

    /// 추출된 텍스트를 지식 베이스에 추가
    ///
    /// 같은 이름의 문서가 있으면 교체합니다. 임베딩에 실패한 청크는 건너뜁니다.
    pub async fn add_text(&self, doc_name: &str, source: &str, text: &str) -> Result<IngestReport> {
        let doc_name = doc_name.trim();
        if doc_name.is_empty() {
            return Err(RagError::EmptyDocumentName.into());
        }
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument.into());
        }

        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(RagError::NoChunks.into());
        }
        tracing::info!("Split into {} chunks", chunks.len());

        let doc_id = Uuid::new_v4().to_string();
        let added_at = Utc::now().to_rfc3339();
        let mut entries = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_index = i as i32;
            let embedding = match self.embedder.embed(chunk).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!("Skipping chunk {} of {}: {:#}", i, doc_name, e);
                    continue;
                }
            };

            entries.push(VectorEntry {
                chunk_id: VectorEntry::make_chunk_id(&doc_id, chunk_index),
                doc_id: doc_id.clone(),
                doc_name: doc_name.to_string(),
                source: source.to_string(),
                chunk_index,
                chunk_text: chunk.clone(),
                added_at: added_at.clone(),
                embedding,
            });
        }

        if entries.is_empty() {
            return Err(RagError::NoEmbeddings.into());
        }

        let _guard = self.write_lock.lock().await;

        // 새 doc_id로 먼저 삽입한 뒤 이전 세대를 지움
        let chunks_stored = self
            .store
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        let replaced_chunks = self
            .store
            .delete_by_doc_name_except(doc_name, &doc_id)
            .await
            .context("Failed to remove previous document version")?;
        if replaced_chunks > 0 {
            tracing::info!(
                "Replaced existing document: {} ({} chunks)",
                doc_name,
                replaced_chunks
            );
        }

        tracing::info!(
            "Added document: {} (id={}, chunks={}/{})",
            doc_name,
            doc_id,
            chunks_stored,
            chunks.len()
        );

        Ok(IngestReport {
            doc_id,
            doc_name: doc_name.to_string(),
            chunks_total: chunks.len(),
            chunks_stored,
            replaced_chunks,
        })
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문과 가장 유사한 청크 검색
    ///
    /// 저장소가 비어 있으면 임베딩 호출 없이 빈 결과를 반환합니다.
    pub async fn search(&self, question: &str, n_results: usize) -> Result<Vec<SearchResult>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion.into());
        }
        if n_results == 0 {
            return Err(RagError::InvalidResultCount.into());
        }

        let total = self.store.count().await?;
        if total == 0 {
            tracing::debug!("Knowledge base is empty");
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .context("Failed to embed question")?;

        let results = self
            .store
            .search(&query_embedding, n_results.min(total))
            .await
            .context("Vector search failed")?;

        tracing::debug!("Found {} relevant chunks", results.len());
        Ok(results)
    }

    /// 질문에 답변
    pub async fn ask(&self, question: &str, n_results: usize) -> Result<QueryResult> {
        let started = Instant::now();
        let question = question.trim();

        tracing::info!("Question received: {}", question);
        let results = self.search(question, n_results).await?;

        if results.is_empty() {
            return Ok(QueryResult {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: Vec::new(),
                chunks_used: 0,
                processing_time: round_to(started.elapsed().as_secs_f64(), 2),
            });
        }

        let context = build_context(&results);
        let answer = self
            .llm
            .generate(question, &context)
            .await
            .context("Failed to generate answer")?;

        let sources: Vec<SourceChunk> = results
            .into_iter()
            .map(|r| SourceChunk {
                document: r.doc_name,
                chunk_index: r.chunk_index,
                text: r.chunk_text,
                similarity: round_to(r.similarity as f64, 3) as f32,
            })
            .collect();

        let processing_time = round_to(started.elapsed().as_secs_f64(), 2);
        tracing::info!(
            "Answer generated in {:.2}s using {} chunks",
            processing_time,
            sources.len()
        );

        Ok(QueryResult {
            answer,
            chunks_used: sources.len(),
            sources,
            processing_time,
        })
    }

    // ========================================================================
    // Management
    // ========================================================================

    /// 지식 베이스 통계
    pub async fn stats(&self) -> Result<KnowledgeStats> {
        let total_chunks = self.store.count().await?;
        let documents = self.store.documents().await?;

        Ok(KnowledgeStats {
            total_chunks,
            total_documents: documents.len(),
            documents: documents.into_iter().map(|d| d.doc_name).collect(),
        })
    }

    /// 문서 목록 (이름순)
    pub async fn documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.documents().await
    }

    /// 이름으로 문서 삭제, 삭제된 청크 수 반환
    pub async fn delete_document(&self, doc_name: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let deleted = self.store.delete_by_doc_name(doc_name).await?;
        if deleted == 0 {
            return Err(RagError::DocumentNotFound(doc_name.to_string()).into());
        }

        tracing::info!("Deleted document: {} ({} chunks)", doc_name, deleted);
        Ok(deleted)
    }

    /// 지식 베이스 초기화
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await?;
        tracing::info!("Knowledge base cleared");
        Ok(())
    }
}

/// 검색 결과를 LLM 컨텍스트로 조합
///
/// `Fragment {n}:` 머리글(1부터) 아래 청크 텍스트를 두고, 빈 줄로 구분합니다.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Fragment {}:\n{}", i + 1, r.chunk_text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory::InMemoryVectorStore;
    use crate::knowledge::{ChunkConfig, WordChunker};
    use crate::testing::{BagOfWordsEmbedder, RecordingLlm};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 삽입 실패를 켜고 끌 수 있고 검색 limit을 기록하는 저장소
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryVectorStore,
        fail_inserts: AtomicBool,
        last_limit: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.insert_batch(entries).await
        }

        async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
            self.last_limit.store(limit, Ordering::SeqCst);
            self.inner.search(query_embedding, limit).await
        }

        async fn delete_by_doc_name(&self, doc_name: &str) -> Result<usize> {
            self.inner.delete_by_doc_name(doc_name).await
        }

        async fn delete_by_doc_name_except(&self, doc_name: &str, keep_doc_id: &str) -> Result<usize> {
            self.inner.delete_by_doc_name_except(doc_name, keep_doc_id).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn documents(&self) -> Result<Vec<DocumentSummary>> {
            self.inner.documents().await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn flaky_system() -> (RagSystem, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let system = RagSystem::new(
            Arc::new(BagOfWordsEmbedder::default()),
            store.clone(),
            Arc::new(RecordingLlm::default()),
            Box::new(WordChunker::with_defaults()),
        );
        (system, store)
    }

    struct Harness {
        system: RagSystem,
        embedder: Arc<BagOfWordsEmbedder>,
        store: Arc<InMemoryVectorStore>,
        llm: Arc<RecordingLlm>,
    }

    fn harness(chunk_words: usize, overlap_words: usize) -> Harness {
        let embedder = Arc::new(BagOfWordsEmbedder::default());
        let store = Arc::new(InMemoryVectorStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let chunker = WordChunker::new(ChunkConfig {
            chunk_words,
            overlap_words,
        })
        .unwrap();

        let system = RagSystem::new(
            embedder.clone(),
            store.clone(),
            llm.clone(),
            Box::new(chunker),
        );

        Harness {
            system,
            embedder,
            store,
            llm,
        }
    }

    fn rag_error(err: &anyhow::Error) -> Option<&RagError> {
        err.downcast_ref::<RagError>()
    }

    #[tokio::test]
    async fn test_add_text_stores_chunks_with_metadata() {
        let h = harness(4, 1);
        let report = h
            .system
            .add_text("notes.txt", "/tmp/notes.txt", "a b c d e f g")
            .await
            .unwrap();

        assert_eq!(report.doc_name, "notes.txt");
        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_stored, 3);
        assert_eq!(report.replaced_chunks, 0);

        let entries = h.store.snapshot().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].chunk_text, "a b c d");
        assert_eq!(entries[1].chunk_text, "d e f g");
        assert_eq!(entries[2].chunk_text, "g");
        assert_eq!(entries[1].chunk_index, 1);
        assert_eq!(entries[1].chunk_id, format!("{}_1", report.doc_id));
        assert!(entries.iter().all(|e| e.source == "/tmp/notes.txt"));
        assert!(entries.iter().all(|e| e.added_at == entries[0].added_at));
    }

    #[tokio::test]
    async fn test_add_text_replaces_same_name() {
        let h = harness(800, 100);
        let first = h.system.add_text("doc", "src", "old content").await.unwrap();
        let second = h.system.add_text("doc", "src", "new content").await.unwrap();

        assert_ne!(first.doc_id, second.doc_id);
        assert_eq!(second.replaced_chunks, 1);

        let entries = h.store.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk_text, "new content");
    }

    #[tokio::test]
    async fn test_add_text_rejects_empty_input() {
        let h = harness(800, 100);

        let err = h.system.add_text("doc", "src", "  \n ").await.unwrap_err();
        assert_eq!(rag_error(&err), Some(&RagError::EmptyDocument));

        let err = h.system.add_text(" ", "src", "text").await.unwrap_err();
        assert_eq!(rag_error(&err), Some(&RagError::EmptyDocumentName));
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped() {
        let h = harness(2, 0);
        let report = h
            .system
            .add_text("doc", "src", "alpha beta FAIL gamma delta epsilon")
            .await
            .unwrap();

        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_stored, 2);
        assert_eq!(report.skipped_chunks(), 1);

        let entries = h.store.snapshot().await;
        let pairs: Vec<(i32, &str)> = entries
            .iter()
            .map(|e| (e.chunk_index, e.chunk_text.as_str()))
            .collect();
        assert_eq!(pairs, vec![(0, "alpha beta"), (2, "delta epsilon")]);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_keeps_previous_document() {
        let h = harness(800, 100);
        h.system.add_text("doc", "src", "original text").await.unwrap();

        let err = h.system.add_text("doc", "src", "FAIL").await.unwrap_err();
        assert_eq!(rag_error(&err), Some(&RagError::NoEmbeddings));

        let entries = h.store.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk_text, "original text");
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_previous_document() {
        let (system, store) = flaky_system();
        system.add_text("doc", "src", "original text").await.unwrap();

        store.fail_inserts.store(true, Ordering::SeqCst);
        let err = system.add_text("doc", "src", "new text").await.unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));

        let entries = store.inner.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk_text, "original text");
    }

    #[tokio::test]
    async fn test_search_limit_clamped_to_chunk_count() {
        let (system, store) = flaky_system();
        system.add_text("a", "src", "alpha").await.unwrap();
        system.add_text("b", "src", "beta").await.unwrap();

        let results = system.search("alpha", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(store.last_limit.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_describe_names_components() {
        let (system, _) = flaky_system();
        let description = system.describe();
        assert!(description.ends_with("chunker=WordChunker"));
        assert!(description.starts_with("embedder="));
    }

    #[tokio::test]
    async fn test_ask_empty_knowledge_base() {
        let h = harness(800, 100);
        let result = h.system.ask("What is Rust?", 3).await.unwrap();

        assert_eq!(result.answer, NO_RESULTS_ANSWER);
        assert!(result.sources.is_empty());
        assert_eq!(result.chunks_used, 0);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
        assert!(h.llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ask_builds_context_from_ranked_chunks() {
        let h = harness(800, 100);
        h.system
            .add_text("rust.md", "src", "rust ownership borrowing lifetimes")
            .await
            .unwrap();
        h.system
            .add_text("cooking.md", "src", "pasta tomato basil garlic")
            .await
            .unwrap();

        let result = h.system.ask("  rust ownership  ", 5).await.unwrap();

        assert_eq!(result.answer, "answer to: rust ownership");
        assert_eq!(result.chunks_used, 2);
        assert_eq!(result.sources[0].document, "rust.md");
        assert!(result.sources[0].similarity >= result.sources[1].similarity);
        assert!(result.processing_time >= 0.0);

        let calls = h.llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (question, context) = &calls[0];
        assert_eq!(question, "rust ownership");
        assert!(context.starts_with("Fragment 1:\nrust ownership borrowing lifetimes"));
        assert!(context.contains("\n\nFragment 2:\npasta tomato basil garlic"));
    }

    #[tokio::test]
    async fn test_ask_limits_results() {
        let h = harness(800, 100);
        for name in ["a", "b", "c", "d"] {
            h.system
                .add_text(name, "src", &format!("topic {}", name))
                .await
                .unwrap();
        }

        let result = h.system.ask("topic", 3).await.unwrap();
        assert_eq!(result.chunks_used, 3);
        assert_eq!(result.sources.len(), 3);
    }

    #[tokio::test]
    async fn test_ask_rejects_invalid_input() {
        let h = harness(800, 100);

        let err = h.system.ask("   ", 3).await.unwrap_err();
        assert_eq!(rag_error(&err), Some(&RagError::EmptyQuestion));

        let err = h.system.ask("question", 0).await.unwrap_err();
        assert_eq!(rag_error(&err), Some(&RagError::InvalidResultCount));
    }

    #[tokio::test]
    async fn test_stats_delete_and_clear() {
        let h = harness(2, 0);
        h.system.add_text("b.txt", "src", "one two three").await.unwrap();
        h.system.add_text("a.txt", "src", "four").await.unwrap();

        let stats = h.system.stats().await.unwrap();
        assert_eq!(
            stats,
            KnowledgeStats {
                total_chunks: 3,
                total_documents: 2,
                documents: vec!["a.txt".to_string(), "b.txt".to_string()],
            }
        );

        assert_eq!(h.system.delete_document("b.txt").await.unwrap(), 2);
        let err = h.system.delete_document("b.txt").await.unwrap_err();
        assert_eq!(
            rag_error(&err),
            Some(&RagError::DocumentNotFound("b.txt".to_string()))
        );

        h.system.clear().await.unwrap();
        let stats = h.system.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert!(stats.documents.is_empty());
    }

    #[tokio::test]
    async fn test_add_document_from_file() {
        let h = harness(800, 100);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, "# Guide\n\nInstall with cargo.").unwrap();

        let report = h.system.add_document(&path, None).await.unwrap();
        assert_eq!(report.doc_name, "guide.md");

        let report = h
            .system
            .add_document_from(&path, Some("Install Guide"), "upload")
            .await
            .unwrap();
        assert_eq!(report.doc_name, "Install Guide");

        let docs = h.system.documents().await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.doc_name.as_str()).collect();
        assert_eq!(names, vec!["Install Guide", "guide.md"]);
        assert_eq!(docs[0].source, "upload");
    }

    #[tokio::test]
    async fn test_add_document_unsupported_format() {
        let h = harness(800, 100);
        let err = h
            .system
            .add_document(Path::new("report.rtf"), None)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<extractor::ExtractError>().is_some());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.87654, 3), 0.877);
        assert_eq!(round_to(1.234, 2), 1.23);
    }
}
