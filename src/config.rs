//! 설정 모듈
//!
//! 환경변수(.env 포함)와 CLI 플래그에서 실행 설정을 구성합니다.
//!
//! ## 환경변수
//! - `VOYAGE_API_KEY` - Voyage AI 임베딩 API 키
//! - `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY` - Gemini API 키
//! - `DOCQA_DB_PATH` - LanceDB 디렉토리
//! - `DOCQA_CACHE_DIR` - 임베딩 캐시 디렉토리
//! - `VOYAGE_MODEL`, `GEMINI_MODEL` - 모델 이름
//! - `DOCQA_CHUNK_WORDS`, `DOCQA_CHUNK_OVERLAP` - 청킹 설정
//! - `VOYAGE_RPM` - 분당 임베딩 요청 제한 (0이면 무제한)

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::knowledge::ChunkConfig;

/// 기본 Voyage 임베딩 모델
pub const DEFAULT_VOYAGE_MODEL: &str = "voyage-2";

/// 기본 Gemini 생성 모델
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// 데이터 디렉토리 경로 (~/.docqa-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Config
// ============================================================================

/// 실행 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// Voyage AI API 키
    pub voyage_api_key: Option<String>,
    /// Gemini API 키
    pub gemini_api_key: Option<String>,
    /// LanceDB 저장 경로
    pub db_path: PathBuf,
    /// 임베딩 캐시 디렉토리
    pub cache_dir: PathBuf,
    /// Voyage 임베딩 모델
    pub voyage_model: String,
    /// Gemini 생성 모델
    pub gemini_model: String,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 분당 임베딩 요청 제한 (0 = 무제한)
    pub embed_rpm: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            voyage_api_key: None,
            gemini_api_key: None,
            db_path: data_dir.join("vectors.lance"),
            cache_dir: data_dir.join("embeddings_cache"),
            voyage_model: DEFAULT_VOYAGE_MODEL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            chunk: ChunkConfig::default(),
            embed_rpm: 0,
        }
    }
}

impl Config {
    /// 환경변수에서 설정 로드
    ///
    /// `.env` 파일이 있으면 먼저 읽습니다. 설정되지 않은 값은 기본값을 사용합니다.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }

        let mut config = Self::default();

        config.voyage_api_key = env_non_empty("VOYAGE_API_KEY");
        config.gemini_api_key =
            env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("GOOGLE_AI_API_KEY"));

        if let Some(path) = env_non_empty("DOCQA_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = env_non_empty("DOCQA_CACHE_DIR") {
            config.cache_dir = PathBuf::from(path);
        }
        if let Some(model) = env_non_empty("VOYAGE_MODEL") {
            config.voyage_model = model;
        }
        if let Some(model) = env_non_empty("GEMINI_MODEL") {
            config.gemini_model = model;
        }
        if let Some(words) = env_parse::<usize>("DOCQA_CHUNK_WORDS")? {
            config.chunk.chunk_words = words;
        }
        if let Some(overlap) = env_parse::<usize>("DOCQA_CHUNK_OVERLAP")? {
            config.chunk.overlap_words = overlap;
        }
        if let Some(rpm) = env_parse::<u32>("VOYAGE_RPM")? {
            config.embed_rpm = rpm;
        }

        Ok(config)
    }

    /// CLI 플래그로 덮어쓰기
    pub fn with_overrides(
        mut self,
        voyage_key: Option<String>,
        gemini_key: Option<String>,
        db_path: Option<PathBuf>,
    ) -> Self {
        if let Some(key) = voyage_key.filter(|k| !k.is_empty()) {
            self.voyage_api_key = Some(key);
        }
        if let Some(key) = gemini_key.filter(|k| !k.is_empty()) {
            self.gemini_api_key = Some(key);
        }
        if let Some(path) = db_path {
            self.db_path = path;
        }
        self
    }

    /// 설정 검증 (API 키 + 청킹 설정)
    pub fn validate(&self) -> Result<()> {
        if self.voyage_api_key.is_none() || self.gemini_api_key.is_none() {
            bail!(
                "Both API keys are required.\n\
                 Set: export VOYAGE_API_KEY=your-key\n\
                 Set: export GEMINI_API_KEY=your-key\n\
                 (or pass --voyage-key / --gemini-key)"
            );
        }
        self.chunk.validate()
    }

    /// Voyage API 키 (검증 후 사용)
    pub fn voyage_key(&self) -> Result<&str> {
        self.voyage_api_key
            .as_deref()
            .context("VOYAGE_API_KEY not set")
    }

    /// Gemini API 키 (검증 후 사용)
    pub fn gemini_key(&self) -> Result<&str> {
        self.gemini_api_key
            .as_deref()
            .context("GEMINI_API_KEY not set")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_non_empty(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", name, raw, e)),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.voyage_model, "voyage-2");
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.chunk.chunk_words, 800);
        assert_eq!(config.chunk.overlap_words, 100);
        assert!(config.db_path.ends_with("vectors.lance"));
    }

    #[test]
    fn test_validate_requires_both_keys() {
        let config = Config::default().with_overrides(Some("v".into()), None, None);
        assert!(config.validate().is_err());

        let config = config.with_overrides(None, Some("g".into()), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_ignore_empty_keys() {
        let config = Config::default().with_overrides(
            Some(String::new()),
            Some("g".into()),
            Some(PathBuf::from("/tmp/db")),
        );
        assert!(config.voyage_api_key.is_none());
        assert_eq!(config.gemini_api_key.as_deref(), Some("g"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/db"));
    }

    #[test]
    fn test_validate_rejects_bad_chunking() {
        let mut config = Config::default().with_overrides(Some("v".into()), Some("g".into()), None);
        config.chunk.overlap_words = config.chunk.chunk_words;
        assert!(config.validate().is_err());
    }
}
