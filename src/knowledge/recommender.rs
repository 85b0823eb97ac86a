//! Recommender - 문서 지문(fingerprint) 기반 유사 논문 추천
//!
//! 문서마다 청크 임베딩의 평균 벡터 하나를 보관하고,
//! 쿼리 지문과의 코사인 유사도로 순위를 매깁니다.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{check_dimension, VectorError};
use super::snapshot::{write_atomic, SNAPSHOT_VERSION};
use super::vector::cosine_similarity;

/// 추천 스냅샷 파일명
pub const PAPERS_FILE: &str = "papers.json";

// ============================================================================
// Types
// ============================================================================

/// 문서 지문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFingerprint {
    /// 문서 식별자 (VectorIndex의 source와 동일)
    pub title: String,
    /// 청크 임베딩 평균 (정규화되지 않았을 수 있음)
    pub embedding: Vec<f32>,
}

/// 추천 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub title: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PapersSnapshot {
    version: u32,
    dimension: usize,
    papers: Vec<PaperFingerprint>,
}

// ============================================================================
// Recommender
// ============================================================================

/// 논문 추천기
///
/// 추가 전용. 같은 제목을 다시 추가하면 별도 항목이 생깁니다.
#[derive(Debug)]
pub struct Recommender {
    dimension: usize,
    papers: Vec<PaperFingerprint>,
}

impl Recommender {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            papers: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// 저장된 제목 목록 (삽입 순서)
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.papers.iter().map(|p| p.title.as_str())
    }

    /// 문서 지문 추가
    pub fn add_paper(
        &mut self,
        title: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Result<(), VectorError> {
        check_dimension(self.dimension, embedding.len())?;
        self.papers.push(PaperFingerprint {
            title: title.into(),
            embedding,
        });
        Ok(())
    }

    /// 제목으로 가장 최근 지문 조회
    pub fn fingerprint(&self, title: &str) -> Option<&PaperFingerprint> {
        self.papers.iter().rev().find(|p| p.title == title)
    }

    /// 쿼리 지문과 유사한 문서 top-k
    pub fn get_recommendations(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<Recommendation>, VectorError> {
        self.rank(query, top_k, None)
    }

    /// 저장된 문서의 지문으로 추천 (해당 제목은 결과에서 제외)
    pub fn recommend_for(
        &self,
        title: &str,
        top_k: usize,
    ) -> Result<Option<Vec<Recommendation>>, VectorError> {
        let Some(fingerprint) = self.fingerprint(title) else {
            return Ok(None);
        };
        self.rank(&fingerprint.embedding, top_k, Some(title)).map(Some)
    }

    fn rank(
        &self,
        query: &[f32],
        top_k: usize,
        exclude: Option<&str>,
    ) -> Result<Vec<Recommendation>, VectorError> {
        if self.papers.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dimension, query.len())?;

        let mut scored: Vec<(usize, f32)> = self
            .papers
            .iter()
            .enumerate()
            .filter(|(_, p)| exclude.map_or(true, |t| p.title != t))
            .map(|(i, p)| (i, cosine_similarity(query, &p.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| Recommendation {
                title: self.papers[i].title.clone(),
                score,
            })
            .collect())
    }

    /// 모든 지문 삭제
    pub fn clear(&mut self) {
        self.papers.clear();
    }

    /// JSON 스냅샷 저장
    pub fn save(&self, path: &Path) -> Result<(), VectorError> {
        let snapshot = PapersSnapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            papers: self.papers.clone(),
        };
        write_atomic(path, &serde_json::to_vec(&snapshot)?)?;
        tracing::debug!("Saved {} paper fingerprints to {:?}", self.papers.len(), path);
        Ok(())
    }

    /// JSON 스냅샷 로드 (파일이 없으면 빈 추천기)
    pub fn load(path: &Path, dimension: usize) -> Result<Self, VectorError> {
        if !path.is_file() {
            return Ok(Self::new(dimension));
        }

        let snapshot: PapersSnapshot = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| VectorError::StorageCorruption(format!("unreadable papers file: {}", e)))?;

        check_dimension(dimension, snapshot.dimension)?;
        if let Some(bad) = snapshot.papers.iter().find(|p| p.embedding.len() != dimension) {
            return Err(VectorError::StorageCorruption(format!(
                "fingerprint '{}' has dimension {}",
                bad.title,
                bad.embedding.len()
            )));
        }

        Ok(Self {
            dimension,
            papers: snapshot.papers,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
