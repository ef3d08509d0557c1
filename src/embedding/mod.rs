//! 임베딩 모듈 - Voyage AI API를 통한 텍스트 벡터화
//!
//! 문서 청크와 질문을 같은 모델로 벡터화합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = VoyageEmbedding::new(api_key, "voyage-2")?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod cache;

pub use cache::{CachedEmbedding, EmbeddingCache};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 프로바이더 이름 (모델 이름)
    fn name(&self) -> &str;
}

// ============================================================================
// Voyage AI Embedding
// ============================================================================

/// Voyage 임베딩 API 엔드포인트
/// source: https://docs.voyageai.com/reference/embeddings-api
pub const VOYAGE_EMBED_URL: &str = "https://api.voyageai.com/v1/embeddings";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// 429/5xx 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Voyage AI 임베딩 구현체
#[derive(Debug)]
pub struct VoyageEmbedding {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    rate_limiter: Option<Arc<Mutex<RateLimiter>>>,
    initial_backoff: Duration,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// 분당 요청 수 기준 생성
    fn per_minute(rpm: u32) -> Self {
        let window = Duration::from_secs(60);
        Self {
            requests: Vec::new(),
            max_requests: rpm,
            window,
            min_delay: window / rpm.max(1),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        // 2. 윈도우 밖의 오래된 요청 제거
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl VoyageEmbedding {
    /// 새 Voyage 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Voyage AI API 키
    /// * `model` - 임베딩 모델 (예: `voyage-2`)
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("API key is required");
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.into(),
            endpoint: VOYAGE_EMBED_URL.to_string(),
            client,
            rate_limiter: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// 분당 요청 제한 설정 (0이면 제한 없음)
    pub fn with_rate_limit(mut self, rpm: u32) -> Self {
        self.rate_limiter = (rpm > 0).then(|| Arc::new(Mutex::new(RateLimiter::per_minute(rpm))));
        self
    }

    /// 엔드포인트 변경 (프록시/테스트용)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// 재시도 초기 백오프 변경
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.pow(attempt)
    }
}

/// Voyage API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

/// Voyage API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Voyage API 에러 응답
#[derive(Debug, Deserialize)]
struct VoyageError {
    detail: serde_json::Value,
}

#[async_trait]
impl EmbeddingProvider for VoyageEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Text cannot be empty");
        }

        let request = EmbedRequest {
            input: vec![text],
            model: &self.model,
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 재시도 루프 (429/5xx 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            if let Some(limiter) = &self.rate_limiter {
                limiter.lock().await.acquire().await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Voyage AI API connection error: {}", e));
                    if attempt < MAX_RETRIES {
                        let backoff = self.backoff(attempt);
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let embed_response: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                let embedding = embed_response
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("Invalid API response format"))?;
                return Ok(embedding);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                let backoff = self.backoff(attempt);
                tracing::warn!(
                    "Voyage AI returned {}, backing off {:?} (attempt {}/{})",
                    status,
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Voyage AI API error: {} - {}", status, body));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                if let Ok(error) = serde_json::from_str::<VoyageError>(&body) {
                    anyhow::bail!("Voyage AI API error ({}): {}", status, error.detail);
                }
                anyhow::bail!("Voyage AI API error: {} - {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
