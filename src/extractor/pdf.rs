//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 텍스트 추출
///
/// 페이지별로 텍스트를 추출하여 (페이지 번호, 텍스트) 튜플 벡터로 반환합니다.
/// 페이지 번호는 1부터 시작합니다. CPU 바운드이므로 async 컨텍스트에서는
/// `spawn_blocking` 안에서 호출해야 합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;
    extract_text_from_bytes(&bytes).with_context(|| format!("Failed to extract text from PDF: {:?}", path))
}

/// 메모리 상의 PDF에서 텍스트 추출
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<Vec<(usize, String)>> {
    let text = pdf_extract::extract_text_from_mem(bytes)?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(Vec::new());
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리 (폼피드 기준)
///
/// 빈 페이지도 번호를 유지하기 위해 남겨둡니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text.split('\x0c').map(|s| s.trim().to_string()).collect();

    // 마지막 폼피드 뒤의 빈 조각 제거
    let end = pages
        .iter()
        .rposition(|p| !p.is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);

    pages.into_iter().take(end).collect()
}

// ============================================================================
// Tests
// ============================================================================
