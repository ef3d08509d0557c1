//! 임베딩 디스크 캐시
//!
//! 텍스트 SHA-256 해시와 모델 이름을 키로 임베딩을 JSON 파일에 저장합니다.
//! 같은 청크를 다시 수집하거나 같은 질문을 반복하면 API 호출을 생략합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 모델별 임베딩 캐시
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    dir: PathBuf,
    model: String,
}

impl EmbeddingCache {
    /// 캐시 디렉토리 열기 (없으면 생성)
    pub fn open(dir: &Path, model: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", dir))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            model: model.replace(['/', '\\', ':'], "_"),
        })
    }

    /// 캐시 파일 경로
    fn entry_path(&self, text: &str) -> PathBuf {
        let hash = Sha256::digest(text.as_bytes());
        self.dir.join(format!("{:x}_{}.json", hash, self.model))
    }

    /// 캐시 조회
    ///
    /// 손상된 항목은 삭제하고 `None`을 반환합니다.
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let path = self.entry_path(text);
        let bytes = tokio::fs::read(&path).await.ok()?;

        match serde_json::from_slice::<Vec<f32>>(&bytes) {
            Ok(embedding) if !embedding.is_empty() => Some(embedding),
            Ok(_) | Err(_) => {
                tracing::warn!("Cache file corrupted, regenerating: {:?}", path);
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    /// 캐시 저장 (실패해도 경고만)
    pub async fn put(&self, text: &str, embedding: &[f32]) {
        let path = self.entry_path(text);
        let result = match serde_json::to_vec(embedding) {
            Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            tracing::warn!("Could not save embedding to cache {:?}: {}", path, e);
        }
    }
}

// ============================================================================
// CachedEmbedding
// ============================================================================

/// 캐시를 거치는 임베딩 프로바이더 래퍼
pub struct CachedEmbedding<P> {
    inner: P,
    cache: EmbeddingCache,
}

impl<P: EmbeddingProvider> CachedEmbedding<P> {
    pub fn new(inner: P, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbedding<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.get(text).await {
            tracing::debug!("Embedding cache hit ({} chars)", text.len());
            return Ok(embedding);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.put(text, &embedding).await;
        Ok(embedding)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Tests
// ============================================================================
