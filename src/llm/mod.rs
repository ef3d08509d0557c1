//! LLM 모듈 - Gemini generateContent로 답변 생성
//!
//! 검색된 문서 조각(context)만 근거로 질문에 답하도록 프롬프트를 구성합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// LlmProvider Trait
// ============================================================================

/// 답변 생성 프로바이더 트레이트
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 질문과 컨텍스트로 답변 생성
    async fn generate(&self, question: &str, context: &str) -> Result<String>;

    /// 프로바이더 이름 (모델 이름)
    fn name(&self) -> &str;
}

/// 근거 기반 답변 프롬프트 구성
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert consultant. Answer the question using ONLY information from the provided context.\n\
         \n\
         Rules:\n\
         Use only facts from the context\n\
         If the context doesn't contain information to answer, say so honestly\n\
         Be precise and specific\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:"
    )
}

// ============================================================================
// Google Gemini
// ============================================================================

/// Gemini API 베이스 URL
/// source: https://ai.google.dev/api/generate-content
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini 답변 생성 구현체
#[derive(Debug)]
pub struct GeminiLlm {
    api_key: String,
    model: String,
    api_base: String,
    client: reqwest::Client,
    generation_config: GenerationConfig,
}

impl GeminiLlm {
    /// 새 Gemini 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 생성 모델 (예: `gemini-2.5-flash`)
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
            api_base: GEMINI_API_BASE.to_string(),
            client,
            generation_config: GenerationConfig::default(),
        })
    }

    /// API 베이스 URL 변경 (프록시/테스트용)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        if question.trim().is_empty() {
            anyhow::bail!("question cannot be empty");
        }
        if context.trim().is_empty() {
            anyhow::bail!("context cannot be empty");
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(question, context),
                }],
            }],
            generation_config: self.generation_config.clone(),
        };

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("gemini API connection error")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                anyhow::bail!(
                    "gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("gemini API error: {} - {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse gemini response")?;

        let answer = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("invalid response format"))?;

        if answer.trim().is_empty() {
            anyhow::bail!("empty response");
        }

        Ok(answer)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// Tests
// ============================================================================
