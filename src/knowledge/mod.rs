//! Knowledge 모듈 - 청킹 + 벡터 저장소
//!
//! - Chunker: 단어 윈도우 텍스트 분할
//! - VectorStore: 청크/임베딩/문서 메타데이터 저장 인터페이스
//! - LanceDB: 코사인 거리 기반 벡터 검색

mod chunker;
mod lance;
mod vector;

#[cfg(test)]
pub(crate) mod memory;

// Re-exports
pub use chunker::{word_chunker, ChunkConfig, Chunker, WordChunker};
pub use lance::LanceVectorStore;
pub use vector::{
    cosine_similarity, summarize_documents, DocumentSummary, SearchResult, VectorEntry,
    VectorStore,
};
