//! 테스트용 결정적 임베딩/LLM 제공자

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::knowledge::memory::InMemoryVectorStore;
use crate::knowledge::WordChunker;
use crate::llm::LlmProvider;
use crate::rag::RagSystem;

const DIM: usize = 16;

/// 단어 해시 버킷 임베딩, `FAIL` 단어가 들어 있으면 실패
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            anyhow::bail!("embedding service unavailable");
        }

        let mut v = vec![0.0f32; DIM];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .map(|b| b as usize)
                .sum::<usize>()
                % DIM;
            v[bucket] += 1.0;
        }
        Ok(v)
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// 받은 (질문, 컨텍스트)를 기록하는 LLM
#[derive(Default)]
pub struct RecordingLlm {
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_string()));
        Ok(format!("answer to: {}", question))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 기본 청킹 설정의 인메모리 시스템
pub fn in_memory_system() -> RagSystem {
    RagSystem::new(
        Arc::new(BagOfWordsEmbedder::default()),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(RecordingLlm::default()),
        Box::new(WordChunker::with_defaults()),
    )
}
