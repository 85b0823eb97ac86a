//! 세션 - 수집 파이프라인 + 검색/추천
//!
//! 세션 하나가 벡터 인덱스와 추천기를 소유합니다.
//! 임베딩 프로바이더는 외부에서 한 번 만들어 `Arc`로 주입합니다.
//!
//! 파이프라인: PDF → 정제 텍스트 → (선택) 압축 → 청크 → 임베딩
//!   → VectorIndex (청크) + Recommender (문서 평균 벡터)

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::compression::CompressionClient;
use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::extractor::{ExtractedPaper, PaperExtractor};
use crate::knowledge::{
    mean_of, paper_chunker, Chunker, Recommendation, Recommender, SearchHit, SourceSummary,
    VectorError, VectorIndex,
};

/// 여러 태스크에서 공유할 때의 세션 핸들
///
/// 쓰기(수집/리셋)는 배타적, 읽기(검색/추천)는 공유됩니다.
pub type SharedSession = Arc<RwLock<Session>>;

/// 에러 체인에 스냅샷 손상이 포함되어 있는지
///
/// 이 경우 `Session::create_empty` + `reset`으로 데이터 디렉토리를 복구할 수 있습니다.
pub fn is_storage_corruption(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<VectorError>(),
            Some(VectorError::StorageCorruption(_))
        )
    })
}

// ============================================================================
// Types
// ============================================================================

/// 수집 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// 추가 전에 벡터 인덱스 비우기 (추천기는 유지)
    pub replace: bool,
    /// ScaleDown 압축 사용
    pub compress: bool,
}

/// 수집 결과
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub title: String,
    pub chunk_count: usize,
    pub page_count: usize,
    pub citations: BTreeSet<u32>,
    /// 압축된 본문이 사용되었는지
    pub compressed: bool,
}

/// 추천 대상
#[derive(Debug, Clone, Copy)]
pub enum RecommendTarget<'a> {
    /// 지정한 논문의 지문
    Paper(&'a str),
    /// 가장 최근에 수집한 논문의 지문
    Latest,
    /// 인덱스 전체 청크의 평균 (여러 논문이 섞이면 의미가 흐려짐)
    CorpusMean,
}

/// 세션 상태 요약
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub provider: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub paper_count: usize,
    pub sources: Vec<SourceSummary>,
    pub snapshot_dir: PathBuf,
}

// ============================================================================
// Session
// ============================================================================

/// 사용자 세션
pub struct Session {
    id: Uuid,
    config: AppConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: VectorIndex,
    recommender: Recommender,
    chunker: Box<dyn Chunker>,
    extractor: PaperExtractor,
    compressor: Option<CompressionClient>,
}

impl Session {
    /// 세션 열기
    ///
    /// 데이터 디렉토리에 스냅샷이 있으면 인덱스와 추천기를 복원합니다.
    pub fn open(config: AppConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if embedder.dimension() != config.dimension {
            bail!(
                "Embedding provider '{}' produces {} dimensions but the index is configured for {}",
                embedder.name(),
                embedder.dimension(),
                config.dimension
            );
        }
        Self::open_with(config, Some(embedder))
    }

    /// 임베딩 프로바이더 없이 열기
    ///
    /// 추천, 목록, 리셋만 가능합니다. 수집/검색은 에러를 반환합니다.
    pub fn open_offline(config: AppConfig) -> Result<Self> {
        Self::open_with(config, None)
    }

    /// 저장된 스냅샷을 읽지 않고 빈 상태로 열기 (임베딩 없음)
    ///
    /// 스냅샷이 손상되어 `open`이 실패할 때 `reset`으로 복구하는 경로입니다.
    pub fn create_empty(config: AppConfig) -> Result<Self> {
        let index = VectorIndex::new(config.dimension, config.index_dir());
        let recommender = Recommender::new(config.dimension);
        Self::assemble(config, None, index, recommender)
    }

    fn open_with(config: AppConfig, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let index = VectorIndex::open(config.dimension, config.index_dir())
            .context("Failed to open vector index")?;
        let recommender = Recommender::load(&config.papers_path(), config.dimension)
            .context("Failed to load paper fingerprints")?;
        Self::assemble(config, embedder, index, recommender)
    }

    fn assemble(
        config: AppConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        index: VectorIndex,
        recommender: Recommender,
    ) -> Result<Self> {
        let compressor = match config.scaledown_api_key.as_deref() {
            Some(key) => Some(CompressionClient::new(key, &config.scaledown_url)?),
            None => None,
        };

        let id = Uuid::new_v4();
        tracing::info!(
            "Session {} opened ({} chunks, {} papers)",
            id,
            index.len(),
            recommender.len()
        );

        Ok(Self {
            id,
            chunker: paper_chunker(config.chunk.clone()),
            config,
            embedder,
            index,
            recommender,
            extractor: PaperExtractor::new(),
            compressor,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn recommender(&self) -> &Recommender {
        &self.recommender
    }

    fn embedder(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.embedder
            .as_ref()
            .context("No embedding provider configured for this session")
    }

    /// 공유 핸들로 변환
    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    /// PDF 파일 수집
    pub async fn ingest_pdf(&mut self, path: &Path, options: IngestOptions) -> Result<IngestReport> {
        let paper = self
            .extractor
            .extract(path)
            .await
            .with_context(|| format!("Failed to extract {:?}", path))?;
        self.ingest_paper(paper, options).await
    }

    /// 추출된 논문 수집
    ///
    /// 청크 임베딩을 인덱스에 추가하고 스냅샷을 저장한 뒤,
    /// 청크 평균 벡터를 추천기에 등록합니다.
    pub async fn ingest_paper(
        &mut self,
        paper: ExtractedPaper,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let (text, compressed) = self.maybe_compress(&paper, options.compress).await;

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            bail!("No chunks produced for {}", paper.title);
        }

        let embedder = self.embedder()?;
        tracing::info!(
            "Embedding {} chunks of {} with {}",
            chunks.len(),
            paper.title,
            embedder.name()
        );
        let vectors = embedder
            .encode(&chunks)
            .await
            .context("Failed to embed chunks")?;

        // 인덱스/추천기를 건드리기 전에 임베딩 출력 검증
        self.index
            .validate(&vectors, &chunks)
            .context("Embedding output does not fit the index")?;
        let fingerprint = mean_of(&vectors, self.config.dimension)?
            .context("Embedding provider returned no vectors")?;

        if options.replace {
            self.index
                .replace_documents(&vectors, &chunks, &paper.title)
                .context("Failed to replace index contents")?;
        } else {
            self.index
                .add_documents(&vectors, &chunks, &paper.title)
                .context("Failed to add chunks to index")?;
        }
        self.index.save_index().context("Failed to save index")?;

        self.recommender
            .add_paper(paper.title.clone(), fingerprint)
            .context("Failed to register paper fingerprint")?;
        self.recommender
            .save(&self.config.papers_path())
            .context("Failed to save paper fingerprints")?;

        tracing::info!(
            "Ingested {} (chunks={}, citations={}, index total={})",
            paper.title,
            chunks.len(),
            paper.citations.len(),
            self.index.len()
        );

        Ok(IngestReport {
            title: paper.title,
            chunk_count: chunks.len(),
            page_count: paper.page_count,
            citations: paper.citations,
            compressed,
        })
    }

    /// 압축 시도 (실패 시 원문 사용)
    async fn maybe_compress(&self, paper: &ExtractedPaper, enabled: bool) -> (String, bool) {
        if !enabled {
            return (paper.full_text.clone(), false);
        }

        let Some(client) = &self.compressor else {
            tracing::warn!("Compression requested but SCALEDOWN_API_KEY is not set; using original text");
            return (paper.full_text.clone(), false);
        };

        match client.compress_paper(&paper.full_text).await {
            Ok(Some(compressed)) => {
                tracing::info!(
                    "Compressed {}: {} -> {} chars",
                    paper.title,
                    paper.full_text.len(),
                    compressed.len()
                );
                (compressed, true)
            }
            Ok(None) => {
                tracing::warn!("Compression returned no result; using original text");
                (paper.full_text.clone(), false)
            }
            Err(e) => {
                tracing::warn!("Compression failed: {:#}; using original text", e);
                (paper.full_text.clone(), false)
            }
        }
    }

    /// 시맨틱 검색
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder()?
            .encode_one(query)
            .await
            .context("Failed to embed query")?;

        Ok(self.index.search(&query_vector, k)?)
    }

    /// 유사 논문 추천
    pub fn recommend(&self, target: RecommendTarget<'_>, k: usize) -> Result<Vec<Recommendation>> {
        match target {
            RecommendTarget::Paper(title) => self
                .recommender
                .recommend_for(title, k)?
                .with_context(|| format!("Paper not found: {}", title)),
            RecommendTarget::Latest => match self.recommender.titles().last() {
                Some(title) => self.recommend(RecommendTarget::Paper(title), k),
                None => Ok(Vec::new()),
            },
            RecommendTarget::CorpusMean => {
                tracing::warn!(
                    "Recommending against the mean of all indexed chunks; \
                     results reflect every ingested paper, not a single one"
                );
                match self.index.mean_embedding()? {
                    Some(query) => Ok(self.recommender.get_recommendations(&query, k)?),
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    /// 인덱스와 추천기 모두 비우고 저장
    pub fn reset(&mut self) -> Result<()> {
        self.index.reset();
        self.recommender.clear();
        self.index.save_index().context("Failed to save index")?;
        self.recommender
            .save(&self.config.papers_path())
            .context("Failed to save paper fingerprints")?;
        tracing::info!("Session {} reset", self.id);
        Ok(())
    }

    /// 상태 요약
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id,
            provider: self
                .embedder
                .as_ref()
                .map_or("none", |e| e.name())
                .to_string(),
            dimension: self.index.dimension(),
            chunk_count: self.index.len(),
            paper_count: self.recommender.len(),
            sources: self.index.sources(),
            snapshot_dir: self.index.snapshot_dir().to_path_buf(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!("Session {} closed", self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::embedding::EmbedPurpose;

    const DIM: usize = 16;

    /// 단어 해시 기반 결정적 임베딩
    #[derive(Default)]
    struct HashEmbedding {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedding {
        async fn embed(&self, text: &str, _purpose: EmbedPurpose) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0f32; DIM];
            for word in text.split_whitespace() {
                let word = word.to_lowercase();
                let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % DIM;
                v[bucket] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "hash"
        }
    }

    /// 선언한 차원보다 하나 짧은 벡터를 돌려주는 프로바이더
    struct ShortEmbedding;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedding {
        async fn embed(&self, _text: &str, _purpose: EmbedPurpose) -> Result<Vec<f32>> {
            Ok(vec![1.0; DIM - 1])
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default().with_data_dir(dir.path());
        config.dimension = DIM;
        config
    }

    fn paper(title: &str, topic: &str) -> ExtractedPaper {
        let pages: Vec<(usize, String)> = (1..=3)
            .map(|i| {
                (
                    i,
                    format!(
                        "Section {} discusses {} in considerable depth with experiments [{}].\n\
                         Further results about {} are reported alongside ablation studies.",
                        i, topic, i, topic
                    ),
                )
            })
            .collect();
        PaperExtractor::from_pages(title.to_string(), &pages).unwrap()
    }

    fn open(dir: &TempDir) -> (Session, Arc<HashEmbedding>) {
        let embedder = Arc::new(HashEmbedding::default());
        let session = Session::open(config(dir), embedder.clone()).unwrap();
        (session, embedder)
    }

    #[tokio::test]
    async fn test_ingest_and_search() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);

        let report = session
            .ingest_paper(paper("graphs.pdf", "graph neural networks"), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.title, "graphs.pdf");
        assert!(report.chunk_count > 0);
        assert_eq!(report.page_count, 3);
        assert_eq!(report.citations.len(), 3);
        assert!(!report.compressed);

        let hits = session.search("graph neural networks", 2).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.len() <= 2);
        assert_eq!(hits[0].source, "graphs.pdf");
    }

    #[tokio::test]
    async fn test_search_empty_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let (session, embedder) = open(&dir);

        assert!(session.search("anything", 5).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_state_restored_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (mut session, _) = open(&dir);
            session
                .ingest_paper(paper("a.pdf", "protein folding"), IngestOptions::default())
                .await
                .unwrap();
        }

        let (session, _) = open(&dir);
        assert!(session.index().len() > 0);
        assert_eq!(session.recommender().len(), 1);
        assert_eq!(session.stats().sources[0].source, "a.pdf");
    }

    #[tokio::test]
    async fn test_recommend_latest_excludes_itself() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);

        for (title, topic) in [
            ("folding.pdf", "protein folding"),
            ("graphs.pdf", "graph neural networks"),
            ("folding2.pdf", "protein folding"),
        ] {
            session
                .ingest_paper(paper(title, topic), IngestOptions::default())
                .await
                .unwrap();
        }

        let recs = session.recommend(RecommendTarget::Latest, 3).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].title, "folding.pdf");
        assert!(recs.iter().all(|r| r.title != "folding2.pdf"));

        assert!(session
            .recommend(RecommendTarget::Paper("missing.pdf"), 3)
            .is_err());
        assert_eq!(session.recommend(RecommendTarget::CorpusMean, 10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_resets_index_but_keeps_fingerprints() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);

        session
            .ingest_paper(paper("a.pdf", "topic one"), IngestOptions::default())
            .await
            .unwrap();
        session
            .ingest_paper(
                paper("b.pdf", "topic two"),
                IngestOptions {
                    replace: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sources = session.index().sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source, "b.pdf");
        assert_eq!(session.recommender().len(), 2);
    }

    #[tokio::test]
    async fn test_compress_without_key_falls_back() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);

        let report = session
            .ingest_paper(
                paper("a.pdf", "sparse attention"),
                IngestOptions {
                    compress: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!report.compressed);
        assert!(report.chunk_count > 0);
    }

    #[tokio::test]
    async fn test_ingest_without_chunks_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);

        let short = PaperExtractor::from_pages("tiny.pdf".to_string(), &[(1, "Too short.".to_string())])
            .unwrap();
        assert!(session.ingest_paper(short, IngestOptions::default()).await.is_err());
        assert!(session.index().is_empty());
        assert!(session.recommender().is_empty());
    }

    #[tokio::test]
    async fn test_reset_persists() {
        let dir = TempDir::new().unwrap();
        {
            let (mut session, _) = open(&dir);
            session
                .ingest_paper(paper("a.pdf", "optics"), IngestOptions::default())
                .await
                .unwrap();
            session.reset().unwrap();
        }

        let (session, _) = open(&dir);
        assert!(session.index().is_empty());
        assert!(session.recommender().is_empty());
        assert_eq!(session.index().dimension(), DIM);
    }

    #[tokio::test]
    async fn test_replace_with_bad_embeddings_keeps_state() {
        let dir = TempDir::new().unwrap();
        {
            let (mut session, _) = open(&dir);
            session
                .ingest_paper(paper("a.pdf", "optics"), IngestOptions::default())
                .await
                .unwrap();
        }

        let mut session = Session::open(config(&dir), Arc::new(ShortEmbedding)).unwrap();
        let before = session.index().len();
        assert!(before > 0);

        let result = session
            .ingest_paper(
                paper("b.pdf", "acoustics"),
                IngestOptions {
                    replace: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(session.index().len(), before);
        assert_eq!(session.index().sources()[0].source, "a.pdf");
        assert_eq!(session.recommender().len(), 1);
        drop(session);

        let (session, _) = open(&dir);
        assert_eq!(session.index().len(), before);
        assert_eq!(session.recommender().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_recovers_corrupted_snapshot() {
        let dir = TempDir::new().unwrap();
        {
            let (mut session, _) = open(&dir);
            session
                .ingest_paper(paper("a.pdf", "optics"), IngestOptions::default())
                .await
                .unwrap();
        }

        let meta_path = config(&dir).index_dir().join(crate::knowledge::META_FILE);
        std::fs::write(&meta_path, b"{ truncated").unwrap();

        let err = Session::open_offline(config(&dir)).err().unwrap();
        assert!(is_storage_corruption(&err));

        let mut session = Session::create_empty(config(&dir)).unwrap();
        session.reset().unwrap();
        drop(session);

        let session = Session::open_offline(config(&dir)).unwrap();
        assert!(session.index().is_empty());
        assert!(session.recommender().is_empty());
        assert_eq!(session.index().dimension(), DIM);
    }

    #[test]
    fn test_is_storage_corruption_ignores_other_errors() {
        let err = anyhow::Error::new(VectorError::DimensionMismatch {
            expected: 4,
            actual: 3,
        })
        .context("Failed to open vector index");
        assert!(!is_storage_corruption(&err));
        assert!(!is_storage_corruption(&anyhow::anyhow!("plain failure")));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.dimension = DIM + 1;

        let result = Session::open(config, Arc::new(HashEmbedding::default()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_session() {
        let dir = TempDir::new().unwrap();
        {
            let (mut session, _) = open(&dir);
            session
                .ingest_paper(paper("a.pdf", "optics"), IngestOptions::default())
                .await
                .unwrap();
            session
                .ingest_paper(paper("b.pdf", "acoustics"), IngestOptions::default())
                .await
                .unwrap();
        }

        let mut session = Session::open_offline(config(&dir)).unwrap();
        assert_eq!(session.stats().provider, "none");
        assert_eq!(session.recommend(RecommendTarget::Latest, 5).unwrap().len(), 1);
        assert!(session.search("optics", 1).await.is_err());
        assert!(session
            .ingest_paper(paper("c.pdf", "optics"), IngestOptions::default())
            .await
            .is_err());

        session.reset().unwrap();
        assert!(session.index().is_empty());
    }

    #[tokio::test]
    async fn test_shared_session_readers() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = open(&dir);
        session
            .ingest_paper(paper("a.pdf", "quantum error correction"), IngestOptions::default())
            .await
            .unwrap();

        let shared = session.into_shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let guard = shared.read().await;
                    guard.search("quantum", 1).await.map(|h| h.len())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
    }
}
