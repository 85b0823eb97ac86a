//! Knowledge 모듈 - 검색 코어
//!
//! - VectorIndex: 청크 임베딩 플랫 인덱스 (정확한 내적 k-NN) + 스냅샷
//! - Recommender: 문서 평균 임베딩 기반 유사 논문 추천
//! - Chunker: 문단 기반 탐욕 청킹

mod chunker;
mod error;
mod recommender;
mod snapshot;
mod vector;

// Re-exports
pub use chunker::{default_chunker, paper_chunker, ChunkConfig, Chunker, PaperChunker};
pub use error::VectorError;
pub use recommender::{PaperFingerprint, Recommendation, Recommender, PAPERS_FILE};
pub use snapshot::{snapshot_exists, INDEX_FILE, META_FILE, SNAPSHOT_VERSION};
pub use vector::{
    cosine_similarity, dot, l2_norm, mean_of, ChunkRecord, SearchHit, SourceSummary, VectorIndex,
    DEFAULT_TOP_K,
};
