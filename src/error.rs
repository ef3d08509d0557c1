//! 파이프라인 입력/상태 에러
//!
//! 호출자가 구분해서 처리해야 하는 에러만 정의합니다.
//! 나머지는 `anyhow::Error`로 컨텍스트와 함께 전파합니다.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RagError {
    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error("n_results must be at least 1")]
    InvalidResultCount,

    #[error("Document name cannot be empty")]
    EmptyDocumentName,

    #[error("Document contains no text")]
    EmptyDocument,

    #[error("No valid chunks created from document")]
    NoChunks,

    #[error("No embeddings could be created")]
    NoEmbeddings,

    #[error("Document not found: {0}")]
    DocumentNotFound(String),
}

impl RagError {
    /// 잘못된 입력으로 인한 에러인지 (HTTP 400)
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuestion
                | Self::InvalidResultCount
                | Self::EmptyDocumentName
                | Self::EmptyDocument
                | Self::NoChunks
        )
    }
}
