//! 벡터 인덱스 / 추천기 에러 타입

use std::path::PathBuf;

/// 검색 코어 에러
///
/// 모든 에러는 해당 연산만 실패시키며 호출자에게 그대로 전달됩니다.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    /// 설정된 차원과 다른 벡터
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 벡터 수와 텍스트 수가 다름
    #[error("length mismatch: {vectors} vectors but {texts} texts")]
    LengthMismatch { vectors: usize, texts: usize },

    /// 스냅샷 손상 (개수 불일치, 체크섬 불일치, 디코딩 실패)
    #[error("storage corruption: {0}")]
    StorageCorruption(String),

    /// 스냅샷이 존재하지 않음
    #[error("snapshot not found at {0}")]
    SnapshotMissing(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for VectorError {
    fn from(e: bincode::Error) -> Self {
        VectorError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for VectorError {
    fn from(e: serde_json::Error) -> Self {
        VectorError::Serialization(e.to_string())
    }
}

/// 차원 검사 헬퍼
pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<(), VectorError> {
    if expected != actual {
        return Err(VectorError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
