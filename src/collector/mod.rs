//! 논문 파일 수집 모듈
//!
//! 단일 PDF 또는 폴더 안의 PDF들을 수집합니다.
//! .gitignore 패턴을 존중합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

/// PDF 확장자 여부
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

// ============================================================================
// Collected Paper
// ============================================================================

/// 수집된 논문 파일
#[derive(Debug, Clone)]
pub struct CollectedPaper {
    /// 파일 절대 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedPaper {
    /// 경로에서 생성 (PDF가 아니거나 파일이 아니면 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        if !is_pdf(&path) {
            return Ok(None);
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            size: metadata.len(),
        }))
    }

    /// 파일명 (문서 식별자)
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

// ============================================================================
// Paper Collector
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 논문 수집기
pub struct PaperCollector {
    config: CollectorConfig,
}

impl PaperCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 수집
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedPaper>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("File not found: {:?}", abs_path);
        }

        if !abs_path.is_file() {
            anyhow::bail!("Not a file: {:?}", abs_path);
        }

        Ok(CollectedPaper::from_path(abs_path)?.filter(|p| self.should_include(p)))
    }

    /// 폴더 재귀 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedPaper>> {
        let abs_path = absolute(path)?;

        if !abs_path.exists() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let mut papers = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedPaper::from_path(entry.path().to_path_buf()) {
                Ok(Some(paper)) if self.should_include(&paper) => papers.push(paper),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to collect file: {}", e),
            }
        }

        papers.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} papers from {:?}", papers.len(), abs_path);
        Ok(papers)
    }

    fn should_include(&self, paper: &CollectedPaper) -> bool {
        if self.config.max_file_size > 0 && paper.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", paper.path, paper.size);
            return false;
        }
        true
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("paper.pdf")));
        assert!(is_pdf(Path::new("PAPER.PDF")));
        assert!(!is_pdf(Path::new("notes.md")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn test_collect_directory_only_pdfs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.PDF"), b"%PDF-1.4").unwrap();

        let papers = PaperCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();

        let names: Vec<_> = papers.iter().map(|p| p.file_name().to_string()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.PDF"]);
    }

    #[test]
    fn test_collect_file_rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("x.txt");
        std::fs::write(&txt, b"hi").unwrap();

        let collector = PaperCollector::with_defaults();
        assert!(collector.collect_file(&txt).unwrap().is_none());
        assert!(collector.collect_file(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn test_max_file_size() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("big.pdf");
        std::fs::write(&pdf, vec![0u8; 64]).unwrap();

        let collector = PaperCollector::new(CollectorConfig {
            max_file_size: 10,
            ..Default::default()
        });
        assert!(collector.collect_file(&pdf).unwrap().is_none());
    }
}
