//! 압축 모듈 - ScaleDown API로 논문 본문 압축
//!
//! 선택 기능입니다. 실패하거나 결과가 없으면 호출자는 원문을 그대로 사용합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// 기본 ScaleDown 엔드포인트
pub const DEFAULT_SCALEDOWN_URL: &str = "https://api.scaledown.xyz/compress/raw/";

/// 압축 지시문
const COMPRESS_CONTEXT: &str =
    "Compress this scientific research paper while preserving technical details.";

#[derive(Debug, Serialize)]
struct CompressRequest<'a> {
    context: &'static str,
    prompt: &'a str,
    scaledown: ScaledownOptions,
}

#[derive(Debug, Serialize)]
struct ScaledownOptions {
    rate: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct CompressResponse {
    #[serde(default)]
    successful: bool,
    #[serde(default)]
    results: Option<CompressResults>,
}

#[derive(Debug, Default, Deserialize)]
struct CompressResults {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    compressed_prompt: Option<String>,
}

impl CompressResponse {
    /// 성공 플래그가 모두 참일 때만 압축 결과 반환
    fn into_compressed(self) -> Option<String> {
        if !self.successful {
            return None;
        }
        self.results
            .filter(|r| r.success)
            .and_then(|r| r.compressed_prompt)
            .filter(|p| !p.trim().is_empty())
    }
}

/// ScaleDown 압축 클라이언트
pub struct CompressionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl CompressionClient {
    /// 새 클라이언트 생성
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid ScaleDown URL: {}", base_url))?;

        let client = reqwest::Client::builder()
            .user_agent("scilit-explorer/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url,
        })
    }

    /// 논문 본문 압축
    ///
    /// API가 성공을 보고하지 않으면 `Ok(None)`.
    pub async fn compress_paper(&self, text: &str) -> Result<Option<String>> {
        tracing::info!("Compressing {} chars via ScaleDown", text.len());

        let payload = CompressRequest {
            context: COMPRESS_CONTEXT,
            prompt: text,
            scaledown: ScaledownOptions { rate: "auto" },
        };

        let response = self
            .client
            .post(self.base_url.clone())
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .context("ScaleDown 요청 실패")?
            .error_for_status()
            .context("ScaleDown 응답 오류")?;

        let body: CompressResponse = response
            .json()
            .await
            .context("ScaleDown 응답 파싱 실패")?;

        Ok(body.into_compressed())
    }
}

// ============================================================================
// Tests
// ============================================================================
