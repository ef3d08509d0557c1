//! docqa-rag - 문서 질의응답 RAG 시스템
//!
//! 업로드한 문서를 단어 윈도우로 청킹하고 Voyage AI 임베딩과 함께
//! LanceDB에 저장합니다. 질문이 들어오면 가장 유사한 청크를 찾아
//! Gemini로 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{get_data_dir, Config};
pub use embedding::{CachedEmbedding, EmbeddingCache, EmbeddingProvider, VoyageEmbedding};
pub use error::RagError;
pub use extractor::{extract_text, DocumentFormat, ExtractError};
pub use knowledge::{
    word_chunker, ChunkConfig, Chunker, DocumentSummary, LanceVectorStore,
    SearchResult, VectorEntry, VectorStore, WordChunker,
};
pub use llm::{GeminiLlm, LlmProvider};
pub use rag::{IngestReport, KnowledgeStats, QueryResult, RagSystem, SourceChunk};
pub use server::{app_router, run_server, AppState, ServerConfig};
