//! scilit-explorer - 과학 논문 탐색기
//!
//! PDF 논문을 청크 단위로 임베딩해 정확한 내적 k-NN으로 검색하고,
//! 문서 평균 임베딩으로 유사 논문을 추천합니다.
//! 인덱스는 로컬 스냅샷(bincode + JSON)으로 저장됩니다.

pub mod citation;
pub mod cli;
pub mod collector;
pub mod compression;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod knowledge;
pub mod session;

// Re-exports
pub use citation::{extract_citations, CitationGraph, GraphStats, NodeKind};
pub use config::{get_data_dir, AppConfig};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbedPurpose, EmbeddingProvider, GeminiEmbedding,
};
pub use extractor::{ExtractedPaper, PaperExtractor};
pub use knowledge::{
    ChunkConfig, Chunker, PaperChunker, Recommendation, Recommender, SearchHit, VectorError,
    VectorIndex,
};
pub use session::{
    is_storage_corruption, IngestOptions, IngestReport, RecommendTarget, Session, SessionStats,
    SharedSession,
};
