//! Text Chunking Module
//!
//! 단어 단위 슬라이딩 윈도우로 텍스트를 분할합니다.
//! 같은 입력과 설정이면 항상 같은 청크를 반환합니다.

use anyhow::{bail, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 당 단어 수
    pub chunk_words: usize,
    /// 청크 간 중첩 단어 수
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_words: 800,
            overlap_words: 100,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증
    ///
    /// 윈도우 이동 폭(`chunk_words - overlap_words`)이 0 이하이면 에러입니다.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_words == 0 {
            bail!("chunk_words must be greater than 0");
        }
        if self.overlap_words >= self.chunk_words {
            bail!(
                "overlap_words ({}) must be smaller than chunk_words ({})",
                self.overlap_words,
                self.chunk_words
            );
        }
        Ok(())
    }

    /// 윈도우 이동 폭
    fn stride(&self) -> usize {
        self.chunk_words.saturating_sub(self.overlap_words).max(1)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WordChunker
// ============================================================================

/// 단어 윈도우 청커
///
/// - 빈 텍스트는 청크 없음
/// - 단어 수가 `chunk_words` 이하이면 원문 그대로 1개 청크
/// - 그 외에는 `chunk_words` 단어씩, `chunk_words - overlap_words` 간격으로 분할
///   (시작 위치가 남아 있는 한 계속, 마지막 윈도우는 짧을 수 있음)
pub struct WordChunker {
    config: ChunkConfig,
}

impl WordChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성 (800 단어, 100 단어 중첩)
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }
}

impl Chunker for WordChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();

        if words.is_empty() {
            return vec![];
        }

        if words.len() <= self.config.chunk_words {
            return vec![text.to_string()];
        }

        // 시작 위치가 텍스트 안에 있는 모든 윈도우 (중첩만 남은 꼬리 윈도우 포함)
        (0..words.len())
            .step_by(self.config.stride())
            .map(|start| {
                let end = (start + self.config.chunk_words).min(words.len());
                words[start..end].join(" ")
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "WordChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정으로 청커 생성
pub fn word_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(WordChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
