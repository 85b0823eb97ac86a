//! 설정 - 환경변수 + 기본값
//!
//! | 환경변수 | 기본값 |
//! |---|---|
//! | `SCILIT_DATA_DIR` | `<data_local_dir>/.scilit-explorer` |
//! | `SCILIT_EMBEDDING_DIM` | 768 |
//! | `SCALEDOWN_API_KEY` | (없음) |
//! | `SCALEDOWN_API_URL` | ScaleDown 기본 엔드포인트 |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::compression::DEFAULT_SCALEDOWN_URL;
use crate::embedding::DEFAULT_DIMENSION;
use crate::knowledge::{ChunkConfig, DEFAULT_TOP_K};

/// 데이터 디렉토리 경로 (~/.scilit-explorer/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scilit-explorer")
}

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 데이터 디렉토리 (스냅샷 저장 위치의 상위)
    pub data_dir: PathBuf,
    /// 임베딩 차원
    pub dimension: usize,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 검색 기본 결과 수
    pub search_top_k: usize,
    /// 추천 기본 결과 수
    pub recommend_top_k: usize,
    /// ScaleDown API 키
    pub scaledown_api_key: Option<String>,
    /// ScaleDown 엔드포인트
    pub scaledown_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            dimension: DEFAULT_DIMENSION,
            chunk: ChunkConfig::default(),
            search_top_k: DEFAULT_TOP_K,
            recommend_top_k: DEFAULT_TOP_K,
            scaledown_api_key: None,
            scaledown_url: DEFAULT_SCALEDOWN_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 구성 (테스트에서 환경변수 대신 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("SCILIT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(dim) = get("SCILIT_EMBEDDING_DIM") {
            config.dimension = dim
                .trim()
                .parse()
                .with_context(|| format!("Invalid SCILIT_EMBEDDING_DIM: {}", dim))?;
            anyhow::ensure!(config.dimension > 0, "SCILIT_EMBEDDING_DIM must be positive");
        }

        config.scaledown_api_key = get("SCALEDOWN_API_KEY");

        if let Some(url) = get("SCALEDOWN_API_URL") {
            url::Url::parse(&url).with_context(|| format!("Invalid SCALEDOWN_API_URL: {}", url))?;
            config.scaledown_url = url;
        }

        Ok(config)
    }

    /// 데이터 디렉토리 변경
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    /// 벡터 인덱스 스냅샷 디렉토리
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// 추천기 스냅샷 파일
    pub fn papers_path(&self) -> PathBuf {
        self.index_dir().join(crate::knowledge::PAPERS_FILE)
    }
}

// ============================================================================
// Tests
// ============================================================================
