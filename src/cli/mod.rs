//! CLI 모듈
//!
//! scilit CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;

use crate::citation::CitationGraph;
use crate::collector::PaperCollector;
use crate::config::AppConfig;
use crate::embedding::{create_embedder, has_api_key};
use crate::extractor::PaperExtractor;
use crate::knowledge::snapshot_exists;
use crate::session::{is_storage_corruption, IngestOptions, RecommendTarget, Session};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "scilit")]
#[command(version, about = "과학 논문 탐색기", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: SCILIT_DATA_DIR 또는 ~/.scilit-explorer)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 파일 또는 폴더를 인덱스에 추가
    Ingest {
        /// 수집할 PDF 파일
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 추가 전에 벡터 인덱스 비우기
        #[arg(long)]
        reset: bool,

        /// ScaleDown으로 본문 압축 후 임베딩
        #[arg(long)]
        compress: bool,
    },

    /// 시맨틱 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short)]
        k: Option<usize>,
    },

    /// 유사 논문 추천
    Recommend {
        /// 기준 논문 (기본: 마지막으로 수집한 논문)
        #[arg(short, long)]
        title: Option<String>,

        /// 결과 개수
        #[arg(short)]
        k: Option<usize>,

        /// 인덱스 전체 평균으로 추천
        #[arg(long, conflicts_with = "title")]
        corpus_mean: bool,
    },

    /// 논문의 참고문헌 마커와 인용 그래프
    Citations {
        /// PDF 파일
        #[arg(long)]
        file: PathBuf,

        /// Graphviz DOT 출력
        #[arg(long)]
        dot: bool,
    },

    /// 수집된 논문 목록
    Papers,

    /// 인덱스와 추천기 초기화
    Reset,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.data_dir)?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            reset,
            compress,
        } => cmd_ingest(config, file, dir, reset, compress).await,
        Commands::Search { query, k } => cmd_search(config, &query, k).await,
        Commands::Recommend {
            title,
            k,
            corpus_mean,
        } => cmd_recommend(config, title, k, corpus_mean),
        Commands::Citations { file, dot } => cmd_citations(&file, dot).await,
        Commands::Papers => cmd_papers(config),
        Commands::Reset => cmd_reset(config),
        Commands::Status => cmd_status(config),
    }
}

fn load_config(data_dir: Option<PathBuf>) -> Result<AppConfig> {
    let config = AppConfig::from_env().context("설정 로드 실패")?;
    Ok(match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

/// 임베딩이 필요한 세션 열기
fn open_session(config: AppConfig) -> Result<Session> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let embedder = create_embedder(config.dimension).context("임베딩 프로바이더 생성 실패")?;
    Session::open(config, embedder).context("세션 열기 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 논문 수집 명령어 (ingest)
///
/// PDF를 추출, 청킹, 임베딩하여 인덱스와 추천기에 저장합니다.
async fn cmd_ingest(
    config: AppConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    reset: bool,
    compress: bool,
) -> Result<()> {
    let collector = PaperCollector::with_defaults();

    let papers = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(p) => vec![p],
            None => {
                println!("[!] PDF 파일이 아닙니다: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    };

    if papers.is_empty() {
        println!("[!] 수집할 PDF가 없습니다.");
        return Ok(());
    }

    let mut session = open_session(config)?;

    let total_size: u64 = papers.iter().map(|p| p.size).sum();
    println!("[*] 수집 대상: {} 논문", papers.len());
    println!("    총 크기: {}", format_bytes(total_size as usize));
    if compress && session.config().scaledown_api_key.is_none() {
        println!("[!] SCALEDOWN_API_KEY가 없어 원문을 그대로 사용합니다.");
    }
    println!();

    // --reset은 첫 번째 성공한 수집에만 적용
    let mut pending_reset = reset;
    let mut success_count = 0;
    let mut error_count = 0;

    for (i, paper) in papers.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, papers.len(), paper.file_name());

        let options = IngestOptions {
            replace: pending_reset,
            compress,
        };

        match session.ingest_pdf(&paper.path, options).await {
            Ok(report) => {
                pending_reset = false;
                success_count += 1;
                println!(
                    "완료 ({} 페이지, {} 청크, 인용 {}{})",
                    report.page_count,
                    report.chunk_count,
                    report.citations.len(),
                    if report.compressed { ", 압축됨" } else { "" }
                );
            }
            Err(e) => {
                error_count += 1;
                println!("실패: {:#}", e);
            }
        }
    }

    let stats = session.stats();
    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);
    println!(
        "     인덱스: {} 청크, 논문 {} 건",
        stats.chunk_count, stats.paper_count
    );

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(config: AppConfig, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.search_top_k);
    let session = open_session(config)?;

    if session.index().is_empty() {
        println!("[!] 인덱스가 비어 있습니다. 먼저 `scilit ingest`로 논문을 추가하세요.");
        return Ok(());
    }

    println!("[*] 검색 중: \"{}\"", query);

    let hits = session.search(query, k).await.context("검색 실패")?;

    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [점수: {:.4}] {}", i + 1, hit.score, hit.source);
        println!(
            "   내용: {}",
            highlight_query(&truncate_text(&hit.text, 300), query)
        );
        println!();
    }

    Ok(())
}

/// 추천 명령어 (recommend)
fn cmd_recommend(
    config: AppConfig,
    title: Option<String>,
    k: Option<usize>,
    corpus_mean: bool,
) -> Result<()> {
    let k = k.unwrap_or(config.recommend_top_k);
    let session = Session::open_offline(config)?;

    let target = match (&title, corpus_mean) {
        (_, true) => RecommendTarget::CorpusMean,
        (Some(t), false) => RecommendTarget::Paper(t),
        (None, false) => RecommendTarget::Latest,
    };

    let recs = session.recommend(target, k)?;

    if recs.is_empty() {
        println!("[!] 추천할 논문이 없습니다. 논문을 두 편 이상 수집하세요.");
        return Ok(());
    }

    let basis = match target {
        RecommendTarget::Paper(t) => t.to_string(),
        RecommendTarget::Latest => session
            .recommender()
            .titles()
            .last()
            .unwrap_or("-")
            .to_string(),
        RecommendTarget::CorpusMean => "전체 인덱스 평균".to_string(),
    };

    println!("[OK] 추천 논문 (기준: {}):\n", basis);
    for (i, rec) in recs.iter().enumerate() {
        println!("{}. [유사도: {:.4}] {}", i + 1, rec.score, rec.title);
    }

    Ok(())
}

/// 인용 명령어 (citations)
async fn cmd_citations(file: &Path, dot: bool) -> Result<()> {
    let paper = PaperExtractor::new()
        .extract(file)
        .await
        .context("PDF 추출 실패")?;

    let mut graph = CitationGraph::new();
    graph.build_star_graph(&paper.title, &paper.citations);

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    if paper.citations.is_empty() {
        println!("[!] {}에서 참고문헌 마커를 찾지 못했습니다.", paper.title);
        return Ok(());
    }

    let markers: Vec<String> = paper.citations.iter().map(|m| format!("[{}]", m)).collect();
    let stats = graph.stats();

    println!("[OK] {} - 참고문헌 마커 {} 개", paper.title, paper.citations.len());
    println!("     {}", markers.join(", "));
    println!();
    println!(
        "     그래프: 노드 {}, 엣지 {}, 밀도 {:.4}",
        stats.num_nodes, stats.num_edges, stats.density
    );

    Ok(())
}

/// 목록 명령어 (papers)
fn cmd_papers(config: AppConfig) -> Result<()> {
    let session = Session::open_offline(config)?;
    let stats = session.stats();

    if stats.paper_count == 0 && stats.chunk_count == 0 {
        println!("[!] 수집된 논문이 없습니다.");
        return Ok(());
    }

    println!("[OK] 추천 대상 논문 ({} 건):", stats.paper_count);
    for title in session.recommender().titles() {
        println!("  - {}", truncate_text(title, 60));
    }

    println!();
    println!("[OK] 인덱스 청크 ({} 건):", stats.chunk_count);
    for source in &stats.sources {
        println!("  {:>5}  {}", source.chunk_count, truncate_text(&source.source, 60));
    }

    Ok(())
}

/// 초기화 명령어 (reset)
///
/// 기존 스냅샷을 읽지 않고 빈 스냅샷으로 덮어쓰므로 손상된 데이터 디렉토리도 복구됩니다.
fn cmd_reset(config: AppConfig) -> Result<()> {
    let previous = match Session::open_offline(config.clone()) {
        Ok(session) => Some(session.stats()),
        Err(e) => {
            println!("[!] 기존 인덱스를 읽을 수 없습니다: {:#}", e);
            None
        }
    };

    let mut session = Session::create_empty(config)?;
    session.reset().context("초기화 실패")?;

    match previous {
        Some(stats) => println!(
            "[OK] 초기화 완료 (청크 {} 건, 논문 {} 건 삭제)",
            stats.chunk_count, stats.paper_count
        ),
        None => println!("[OK] 초기화 완료 (빈 인덱스로 덮어씀)"),
    }
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: AppConfig) -> Result<()> {
    println!("scilit-explorer v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 임베딩 차원: {}", config.dimension);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    if config.scaledown_api_key.is_some() {
        println!("[OK] ScaleDown 압축: 사용 가능");
    } else {
        println!("[*] ScaleDown 압축: 미설정 (SCALEDOWN_API_KEY)");
    }

    if !snapshot_exists(&config.index_dir()) {
        println!("[*] 저장된 인덱스 없음");
        return Ok(());
    }

    match Session::open_offline(config) {
        Ok(session) => {
            let stats = session.stats();
            println!("[OK] 벡터 인덱스: {} 청크", stats.chunk_count);
            println!("[OK] 추천 대상 논문: {} 건", stats.paper_count);
        }
        Err(e) => {
            println!("[!] 인덱스 열기 실패: {:#}", e);
            if is_storage_corruption(&e) {
                println!("    스냅샷이 손상되었습니다. `scilit reset`으로 초기화하세요.");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 쿼리 단어 강조 (대소문자 무시, 단어 단위)
///
/// 점수와 무관한 표시용입니다.
fn highlight_query(text: &str, query: &str) -> String {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();

    if words.is_empty() {
        return text.to_string();
    }

    let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "\x1b[1;33m$0\x1b[0m").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1048576), "3.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        assert_eq!(truncate_text(korean, 5), "안녕하세요...");
    }

    #[test]
    fn test_highlight_whole_words_case_insensitive() {
        let out = highlight_query("Attention is all; attentions differ. ATTENTION!", "attention");
        assert_eq!(
            out,
            "\x1b[1;33mAttention\x1b[0m is all; attentions differ. \x1b[1;33mATTENTION\x1b[0m!"
        );
    }

    #[test]
    fn test_highlight_multiple_words_and_punctuation() {
        let out = highlight_query("graph neural nets", "Graph, (nets)");
        assert_eq!(
            out,
            "\x1b[1;33mgraph\x1b[0m neural \x1b[1;33mnets\x1b[0m"
        );
        assert_eq!(highlight_query("unchanged", "  ...  "), "unchanged");
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["scilit", "search", "transformers", "-k", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { k: Some(5), .. }));

        let cli = Cli::try_parse_from([
            "scilit",
            "--data-dir",
            "/tmp/x",
            "ingest",
            "--dir",
            "papers",
            "--reset",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Commands::Ingest { reset: true, .. }));

        assert!(Cli::try_parse_from(["scilit", "recommend", "--title", "a", "--corpus-mean"]).is_err());
    }
}
