//! 논문 추출 모듈
//!
//! PDF → 원문 → 정제된 본문 + 인용 마커.
//! - PDF 파싱: pdf-extract (blocking, spawn_blocking에서 실행)
//! - 정제: 하이픈 줄바꿈 결합, 연속 줄바꿈/공백 축약

pub mod pdf;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::citation::extract_citations;

// ============================================================================
// Extracted Paper
// ============================================================================

/// 추출된 논문
#[derive(Debug, Clone)]
pub struct ExtractedPaper {
    /// 문서 식별자 (파일명)
    pub title: String,
    /// 정제된 전체 본문 (`[Page N]` 마커 포함)
    pub full_text: String,
    /// 참고문헌 마커
    pub citations: BTreeSet<u32>,
    /// 텍스트가 있는 페이지 수
    pub page_count: usize,
}

// ============================================================================
// Paper Extractor
// ============================================================================

/// 논문 추출기
#[derive(Debug, Default, Clone)]
pub struct PaperExtractor;

impl PaperExtractor {
    pub fn new() -> Self {
        Self
    }

    /// PDF 파일에서 논문 추출
    pub async fn extract(&self, path: &Path) -> Result<ExtractedPaper> {
        let title = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid file name: {:?}", path))?;

        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
            .await
            .context("PDF extraction task failed")??;

        let paper = Self::from_pages(title, &pages)?;
        tracing::info!(
            "Extracted {}: {} pages, {} chars, {} citation markers",
            paper.title,
            paper.page_count,
            paper.full_text.len(),
            paper.citations.len()
        );
        Ok(paper)
    }

    /// 페이지 텍스트 목록에서 논문 구성
    pub fn from_pages(title: String, pages: &[(usize, String)]) -> Result<ExtractedPaper> {
        let mut raw = String::new();
        let mut page_count = 0;

        for (page_num, text) in pages {
            if text.trim().is_empty() {
                continue;
            }
            raw.push_str(&format!("\n\n[Page {}]\n\n", page_num));
            raw.push_str(text);
            page_count += 1;
        }

        if raw.trim().is_empty() {
            bail!("No readable text found in PDF: {}", title);
        }

        let full_text = clean_text(&raw);
        let citations = extract_citations(&full_text);

        Ok(ExtractedPaper {
            title,
            full_text,
            citations,
            page_count,
        })
    }
}

// ============================================================================
// Text Cleaning
// ============================================================================

struct CleanPatterns {
    hyphen_break: Regex,
    newlines: Regex,
    spaces: Regex,
}

fn clean_patterns() -> &'static CleanPatterns {
    static PATTERNS: OnceLock<CleanPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CleanPatterns {
        hyphen_break: Regex::new(r"-\n").expect("valid regex"),
        newlines: Regex::new(r"\n+").expect("valid regex"),
        spaces: Regex::new(r"[ \t]+").expect("valid regex"),
    })
}

/// 추출 텍스트 정제
///
/// 1. 줄 끝 하이픈 결합 (`trans-\nformer` → `transformer`)
/// 2. 연속 줄바꿈 → 한 줄
/// 3. 연속 공백/탭 → 공백 하나
pub fn clean_text(text: &str) -> String {
    let p = clean_patterns();
    let text = p.hyphen_break.replace_all(text, "");
    let text = p.newlines.replace_all(&text, "\n");
    let text = p.spaces.replace_all(&text, " ");
    text.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
