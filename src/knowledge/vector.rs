//! Vector Index - 플랫 내적(inner product) 인덱스
//!
//! 모든 청크 임베딩을 하나의 벡터에 보관하고 정확한(brute-force) k-NN 검색을 수행합니다.
//! 저장/조회 벡터는 모두 L2 정규화되어 있으므로 내적 = 코사인 유사도입니다.

use std::path::{Path, PathBuf};

use super::error::{check_dimension, VectorError};
use super::snapshot::{load_snapshot, save_snapshot, snapshot_exists};

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 청크 레코드 (임베딩 + 원문 + 출처)
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// 정규화된 임베딩 벡터
    pub embedding: Vec<f32>,
    /// 청크 텍스트
    pub text: String,
    /// 원본 문서 식별자 (파일명)
    pub source: String,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// 청크 텍스트
    pub text: String,
    /// 내적 스코어 (높을수록 유사)
    pub score: f32,
    /// 원본 문서 식별자
    pub source: String,
}

/// 소스별 청크 수
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub chunk_count: usize,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 플랫 벡터 인덱스
///
/// 레코드는 삽입 순서대로 저장되며 리셋 외에는 수정되지 않습니다.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    records: Vec<ChunkRecord>,
    snapshot_dir: PathBuf,
}

impl VectorIndex {
    /// 빈 인덱스 생성
    ///
    /// # Arguments
    /// * `dimension` - 임베딩 차원 (고정)
    /// * `snapshot_dir` - 스냅샷 저장 디렉토리
    pub fn new(dimension: usize, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    /// 스냅샷이 있으면 로드, 없으면 빈 인덱스
    pub fn open(dimension: usize, snapshot_dir: impl Into<PathBuf>) -> Result<Self, VectorError> {
        let mut index = Self::new(dimension, snapshot_dir);
        if snapshot_exists(&index.snapshot_dir) {
            index.load_index()?;
        }
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// 추가할 입력 검증 (길이, 차원)
    pub fn validate(&self, vectors: &[Vec<f32>], texts: &[String]) -> Result<(), VectorError> {
        if vectors.len() != texts.len() {
            return Err(VectorError::LengthMismatch {
                vectors: vectors.len(),
                texts: texts.len(),
            });
        }
        for vector in vectors {
            check_dimension(self.dimension, vector.len())?;
        }
        Ok(())
    }

    /// 문서 청크 일괄 추가
    ///
    /// 모든 입력을 먼저 검증하므로 에러 시 인덱스는 변경되지 않습니다.
    pub fn add_documents(
        &mut self,
        vectors: &[Vec<f32>],
        texts: &[String],
        source: &str,
    ) -> Result<(), VectorError> {
        self.validate(vectors, texts)?;

        self.records.extend(Self::to_records(vectors, texts, source));

        tracing::debug!(
            "Indexed {} chunks from {} (total={})",
            vectors.len(),
            source,
            self.records.len()
        );
        Ok(())
    }

    /// 기존 레코드를 모두 버리고 한 문서의 청크로 교체
    ///
    /// 검증을 통과한 뒤에만 교체하므로 에러 시 기존 레코드가 유지됩니다.
    pub fn replace_documents(
        &mut self,
        vectors: &[Vec<f32>],
        texts: &[String],
        source: &str,
    ) -> Result<(), VectorError> {
        self.validate(vectors, texts)?;

        let discarded = self.records.len();
        self.records = Self::to_records(vectors, texts, source).collect();

        tracing::debug!(
            "Replaced {} chunks with {} from {}",
            discarded,
            self.records.len(),
            source
        );
        Ok(())
    }

    fn to_records<'a>(
        vectors: &'a [Vec<f32>],
        texts: &'a [String],
        source: &'a str,
    ) -> impl Iterator<Item = ChunkRecord> + 'a {
        vectors.iter().zip(texts).map(move |(vector, text)| ChunkRecord {
            embedding: vector.clone(),
            text: text.clone(),
            source: source.to_string(),
        })
    }

    /// 정확한 최대 내적 검색
    ///
    /// 결과 길이는 `min(k, len)`, 스코어 내림차순, 동점은 먼저 삽입된 레코드 우선.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorError> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dimension, query.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, dot(query, &r.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let record = &self.records[i];
                SearchHit {
                    text: record.text.clone(),
                    score,
                    source: record.source.clone(),
                }
            })
            .collect())
    }

    /// 스냅샷 저장
    pub fn save_index(&self) -> Result<(), VectorError> {
        save_snapshot(&self.snapshot_dir, self.dimension, &self.records)
    }

    /// 스냅샷 복원
    ///
    /// 검증이 끝난 뒤에만 현재 레코드를 교체합니다. 실패 시 기존 상태 유지.
    pub fn load_index(&mut self) -> Result<(), VectorError> {
        let records = load_snapshot(&self.snapshot_dir, self.dimension)?;
        self.records = records;
        tracing::info!(
            "Loaded vector index: {} chunks (dim={})",
            self.records.len(),
            self.dimension
        );
        Ok(())
    }

    /// 모든 레코드 삭제 (차원 유지)
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// 소스별 청크 수 (최초 등장 순서)
    pub fn sources(&self) -> Vec<SourceSummary> {
        let mut summaries: Vec<SourceSummary> = Vec::new();
        for record in &self.records {
            match summaries.iter_mut().find(|s| s.source == record.source) {
                Some(summary) => summary.chunk_count += 1,
                None => summaries.push(SourceSummary {
                    source: record.source.clone(),
                    chunk_count: 1,
                }),
            }
        }
        summaries
    }

    /// 전체 임베딩 평균 (비어있으면 None)
    pub fn mean_embedding(&self) -> Result<Option<Vec<f32>>, VectorError> {
        let vectors: Vec<&[f32]> = self.records.iter().map(|r| r.embedding.as_slice()).collect();
        mean_of(&vectors, self.dimension)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 내적
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 노름
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 코사인 유사도
///
/// 길이가 다르거나 한쪽 노름이 0이면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

/// 벡터 평균 (재정규화하지 않음)
///
/// 입력이 비어있으면 `Ok(None)`, 차원이 다른 벡터가 있으면 에러입니다.
pub fn mean_of<V: AsRef<[f32]>>(
    vectors: &[V],
    dimension: usize,
) -> Result<Option<Vec<f32>>, VectorError> {
    if vectors.is_empty() {
        return Ok(None);
    }
    for v in vectors {
        check_dimension(dimension, v.as_ref().len())?;
    }

    let mut mean = vec![0.0f32; dimension];
    for v in vectors {
        for (m, x) in mean.iter_mut().zip(v.as_ref()) {
            *m += x;
        }
    }

    let n = vectors.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    Ok(Some(mean))
}

// ============================================================================
// Tests
// ============================================================================
