//! Text Chunking Module
//!
//! 논문 본문을 문단 단위로 탐욕적으로 묶어 청크를 만듭니다.
//! 너무 짧은 문단(헤더, 페이지 번호, 캡션 조각 등)은 버립니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 이보다 짧은 문단은 무시 (문자 수)
    pub min_paragraph_chars: usize,
    /// 청크 최대 크기 (문자 수, 미만 유지)
    pub max_chunk_chars: usize,
    /// 문서당 최대 청크 수
    pub max_chunks: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_paragraph_chars: 40,
            max_chunk_chars: 1000,
            max_chunks: 150,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// PaperChunker
// ============================================================================

/// 문단 기반 탐욕 청커
///
/// - 줄바꿈으로 문단 분리
/// - 짧은 문단 제거
/// - 최대 크기 미만이 유지되는 동안 공백으로 이어붙임
pub struct PaperChunker {
    config: ChunkConfig,
}

impl PaperChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for PaperChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for para in text.split('\n') {
            let para = para.trim();
            let para_len = para.chars().count();
            if para_len < self.config.min_paragraph_chars {
                continue;
            }

            if current_len + para_len < self.config.max_chunk_chars {
                if !current.is_empty() {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(para);
                current_len += para_len;
            } else {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push_str(para);
                current_len = para_len;
            }

            if chunks.len() >= self.config.max_chunks {
                break;
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks.truncate(self.config.max_chunks);
        chunks
    }

    fn name(&self) -> &'static str {
        "PaperChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(PaperChunker::with_defaults())
}

/// 논문 청커 생성 (설정 지정)
pub fn paper_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(PaperChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn para(c: char, n: usize) -> String {
        std::iter::repeat(c).take(n).collect()
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = PaperChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("\n\n  \n").is_empty());
    }

    #[test]
    fn test_short_paragraphs_dropped() {
        let chunker = PaperChunker::with_defaults();
        let text = "Abstract\n1\nThis paragraph is long enough to be kept as retrievable text.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("This paragraph"));
    }

    #[test]
    fn test_paragraphs_joined_until_budget() {
        let config = ChunkConfig {
            min_paragraph_chars: 5,
            max_chunk_chars: 25,
            max_chunks: 10,
        };
        let chunker = PaperChunker::new(config);

        let text = format!("{}\n{}\n{}", para('a', 10), para('b', 10), para('c', 10));
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{} {}", para('a', 10), para('b', 10)));
        assert_eq!(chunks[1], para('c', 10));
    }

    #[test]
    fn test_oversized_paragraph_not_preceded_by_empty_chunk() {
        let config = ChunkConfig {
            min_paragraph_chars: 5,
            max_chunk_chars: 20,
            max_chunks: 10,
        };
        let chunker = PaperChunker::new(config);

        let chunks = chunker.chunk(&para('x', 50));
        assert_eq!(chunks, vec![para('x', 50)]);
    }

    #[test]
    fn test_max_chunks_cap() {
        let config = ChunkConfig {
            min_paragraph_chars: 1,
            max_chunk_chars: 5,
            max_chunks: 3,
        };
        let chunker = PaperChunker::new(config);

        let text = (0..10).map(|_| "abcdef").collect::<Vec<_>>().join("\n");
        assert_eq!(chunker.chunk(&text).len(), 3);
    }

    #[test]
    fn test_unicode_counts_chars() {
        let config = ChunkConfig {
            min_paragraph_chars: 3,
            max_chunk_chars: 10,
            max_chunks: 10,
        };
        let chunker = PaperChunker::new(config);

        // 4글자 + 공백 + 4글자 = 9 < 10
        let chunks = chunker.chunk("가나다라\n마바사아");
        assert_eq!(chunks, vec!["가나다라 마바사아".to_string()]);
    }

    #[test]
    fn test_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.min_paragraph_chars, 40);
        assert_eq!(config.max_chunk_chars, 1000);
        assert_eq!(config.max_chunks, 150);
    }
}
