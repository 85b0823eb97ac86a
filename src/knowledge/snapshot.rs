//! 스냅샷 - 벡터 인덱스 디스크 저장/복원
//!
//! 디렉토리 구성:
//! - `index.bin`  : bincode 인코딩된 임베딩 행렬 (row-major)
//! - `meta.json`  : 텍스트/소스 병렬 목록 + index.bin의 SHA-256
//!
//! 각 파일은 임시 파일에 쓰고 fsync 후 rename 합니다.
//! meta.json이 마지막에 교체되므로 체크섬이 맞지 않는 쌍은 로드 시 거부됩니다.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{check_dimension, VectorError};
use super::vector::ChunkRecord;

/// 스냅샷 포맷 버전
pub const SNAPSHOT_VERSION: u32 = 1;

/// 임베딩 블롭 파일명
pub const INDEX_FILE: &str = "index.bin";

/// 메타데이터 파일명
pub const META_FILE: &str = "meta.json";

// ============================================================================
// On-disk Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct IndexBlob {
    dimension: usize,
    count: usize,
    vectors: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    version: u32,
    dimension: usize,
    texts: Vec<String>,
    sources: Vec<String>,
    index_sha256: String,
    saved_at: DateTime<Utc>,
}

// ============================================================================
// Save / Load
// ============================================================================

/// 스냅샷 존재 여부 (meta.json 기준)
pub fn snapshot_exists(dir: &Path) -> bool {
    dir.join(META_FILE).is_file()
}

/// 레코드 목록을 스냅샷으로 저장
pub(crate) fn save_snapshot(
    dir: &Path,
    dimension: usize,
    records: &[ChunkRecord],
) -> Result<(), VectorError> {
    fs::create_dir_all(dir)?;

    let mut vectors = Vec::with_capacity(records.len() * dimension);
    let mut texts = Vec::with_capacity(records.len());
    let mut sources = Vec::with_capacity(records.len());

    for record in records {
        vectors.extend_from_slice(&record.embedding);
        texts.push(record.text.clone());
        sources.push(record.source.clone());
    }

    let blob = IndexBlob {
        dimension,
        count: records.len(),
        vectors,
    };
    let blob_bytes = bincode::serialize(&blob)?;

    let meta = SnapshotMeta {
        version: SNAPSHOT_VERSION,
        dimension,
        texts,
        sources,
        index_sha256: sha256_hex(&blob_bytes),
        saved_at: Utc::now(),
    };
    let meta_bytes = serde_json::to_vec(&meta)?;

    write_atomic(&dir.join(INDEX_FILE), &blob_bytes)?;
    write_atomic(&dir.join(META_FILE), &meta_bytes)?;

    tracing::debug!(
        "Saved snapshot to {:?} ({} records, dim={})",
        dir,
        records.len(),
        dimension
    );
    Ok(())
}

/// 스냅샷에서 레코드 목록 복원
///
/// 두 파일을 모두 검증한 뒤에만 레코드를 반환합니다.
pub(crate) fn load_snapshot(dir: &Path, dimension: usize) -> Result<Vec<ChunkRecord>, VectorError> {
    let meta_path = dir.join(META_FILE);
    let index_path = dir.join(INDEX_FILE);

    if !meta_path.is_file() {
        return Err(VectorError::SnapshotMissing(meta_path));
    }
    if !index_path.is_file() {
        return Err(VectorError::StorageCorruption(format!(
            "index blob missing: {:?}",
            index_path
        )));
    }

    let meta_bytes = fs::read(&meta_path)?;
    let meta: SnapshotMeta = serde_json::from_slice(&meta_bytes)
        .map_err(|e| VectorError::StorageCorruption(format!("unreadable metadata: {}", e)))?;

    if meta.version > SNAPSHOT_VERSION {
        return Err(VectorError::StorageCorruption(format!(
            "unsupported snapshot version {}",
            meta.version
        )));
    }

    let blob_bytes = fs::read(&index_path)?;
    if sha256_hex(&blob_bytes) != meta.index_sha256 {
        return Err(VectorError::StorageCorruption(
            "index blob checksum does not match metadata".to_string(),
        ));
    }

    let blob: IndexBlob = bincode::deserialize(&blob_bytes)
        .map_err(|e| VectorError::StorageCorruption(format!("unreadable index blob: {}", e)))?;

    if blob.dimension != meta.dimension {
        return Err(VectorError::StorageCorruption(format!(
            "blob dimension {} differs from metadata dimension {}",
            blob.dimension, meta.dimension
        )));
    }
    check_dimension(dimension, blob.dimension)?;

    if blob.vectors.len() != blob.count * blob.dimension {
        return Err(VectorError::StorageCorruption(format!(
            "blob holds {} floats, expected {} x {}",
            blob.vectors.len(),
            blob.count,
            blob.dimension
        )));
    }

    if meta.texts.len() != blob.count || meta.sources.len() != blob.count {
        return Err(VectorError::StorageCorruption(format!(
            "{} embeddings but {} texts and {} sources",
            blob.count,
            meta.texts.len(),
            meta.sources.len()
        )));
    }

    let records = if dimension == 0 {
        meta.texts
            .into_iter()
            .zip(meta.sources)
            .map(|(text, source)| ChunkRecord {
                embedding: Vec::new(),
                text,
                source,
            })
            .collect()
    } else {
        blob.vectors
            .chunks_exact(dimension)
            .zip(meta.texts.into_iter().zip(meta.sources))
            .map(|(embedding, (text, source))| ChunkRecord {
                embedding: embedding.to_vec(),
                text,
                source,
            })
            .collect::<Vec<_>>()
    };

    tracing::debug!("Loaded snapshot from {:?} ({} records)", dir, records.len());
    Ok(records)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임시 파일 + rename 으로 원자적 쓰기
///
/// 실패 시 임시 파일을 제거합니다.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VectorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(v: &[f32], text: &str) -> ChunkRecord {
        ChunkRecord {
            embedding: v.to_vec(),
            text: text.to_string(),
            source: "doc.pdf".to_string(),
        }
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("index");

        save_snapshot(&target, 2, &[record(&[1.0, 0.0], "a")]).unwrap();

        assert!(target.join(INDEX_FILE).is_file());
        assert!(target.join(META_FILE).is_file());
        assert!(snapshot_exists(&target));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        // 대상 경로가 비어있지 않은 디렉토리면 rename이 실패
        let target = dir.path().join(INDEX_FILE);
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), b"x").unwrap();

        let err = write_atomic(&target, b"payload").unwrap_err();
        assert!(matches!(err, VectorError::Io(_)));
        assert!(!dir.path().join(".index.bin.tmp").exists());
        assert!(target.is_dir());
    }

    #[test]
    fn test_failed_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join(INDEX_FILE);
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("occupied"), b"x").unwrap();

        assert!(save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).is_err());
        assert!(!snapshot_exists(dir.path()));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(matches!(err, VectorError::SnapshotMissing(_)));
    }

    #[test]
    fn test_missing_blob_is_corruption() {
        let dir = TempDir::new().unwrap();
        save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).unwrap();
        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(matches!(err, VectorError::StorageCorruption(_)));
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).unwrap();

        // 다른 내용의 블롭으로 교체
        let other = TempDir::new().unwrap();
        save_snapshot(other.path(), 2, &[record(&[0.0, 1.0], "b")]).unwrap();
        fs::copy(other.path().join(INDEX_FILE), dir.path().join(INDEX_FILE)).unwrap();

        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(matches!(err, VectorError::StorageCorruption(_)));
    }

    #[test]
    fn test_wrong_configured_dimension() {
        let dir = TempDir::new().unwrap();
        save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).unwrap();

        let err = load_snapshot(dir.path(), 3).unwrap_err();
        assert!(matches!(
            err,
            VectorError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_garbage_metadata_is_corruption() {
        let dir = TempDir::new().unwrap();
        save_snapshot(dir.path(), 2, &[record(&[1.0, 0.0], "a")]).unwrap();
        fs::write(dir.path().join(META_FILE), b"not json").unwrap();

        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(matches!(err, VectorError::StorageCorruption(_)));
    }
}
