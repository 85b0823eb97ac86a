//! 인용 모듈 - 참고문헌 마커 추출 및 인용 그래프
//!
//! 본문의 `[12]` 형태 마커를 수집하고,
//! 논문 → 참고문헌 방향의 스타(star) 그래프를 만듭니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Citation Extraction
// ============================================================================

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid citation regex"))
}

/// 텍스트에서 참고문헌 마커 추출 (중복 제거, 오름차순)
pub fn extract_citations(text: &str) -> BTreeSet<u32> {
    citation_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .collect()
}

// ============================================================================
// Citation Graph
// ============================================================================

/// 노드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 분석 대상 논문
    Main,
    /// 인용된 참고문헌
    Reference,
}

/// 그래프 통계
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    /// 방향 그래프 밀도: e / (n (n - 1))
    pub density: f64,
}

/// 인용 그래프 (방향)
#[derive(Debug, Default)]
pub struct CitationGraph {
    /// 삽입 순서를 유지하는 노드 목록
    nodes: Vec<(String, NodeKind)>,
    /// 출발 노드 → 도착 노드 집합
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl CitationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 그래프 초기화
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// 스타 그래프 생성: 논문 → 각 참고문헌
    pub fn build_star_graph<'a, I>(&mut self, main_title: &str, citations: I)
    where
        I: IntoIterator<Item = &'a u32>,
    {
        self.clear();
        self.add_node(main_title, NodeKind::Main);

        for (idx, marker) in citations.into_iter().enumerate() {
            let label = format!("Ref [{}] {}", idx + 1, marker);
            self.add_node(&label, NodeKind::Reference);
            self.add_edge(main_title, &label);
        }
    }

    /// 단일 인용 관계 추가 (노드가 없으면 생성)
    pub fn add_citation(&mut self, citing: &str, cited: &str) {
        self.add_node(citing, NodeKind::Reference);
        self.add_node(cited, NodeKind::Reference);
        self.add_edge(citing, cited);
    }

    fn add_node(&mut self, label: &str, kind: NodeKind) {
        if !self.nodes.iter().any(|(l, _)| l == label) {
            self.nodes.push((label.to_string(), kind));
        }
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 노드 목록 (삽입 순서)
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.nodes.iter().map(|(l, k)| (l.as_str(), *k))
    }

    /// 특정 노드의 나가는 간선
    pub fn neighbors(&self, label: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(label)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// 기본 통계
    pub fn stats(&self) -> GraphStats {
        let n = self.node_count();
        let e = self.edge_count();
        let density = if n > 1 {
            e as f64 / (n as f64 * (n as f64 - 1.0))
        } else {
            0.0
        };

        GraphStats {
            num_nodes: n,
            num_edges: e,
            density,
        }
    }

    /// Graphviz DOT 렌더링
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph citations {\n");

        for (label, kind) in &self.nodes {
            let color = match kind {
                NodeKind::Main => "red",
                NodeKind::Reference => "skyblue",
            };
            let _ = writeln!(
                out,
                "    \"{}\" [style=filled, fillcolor={}];",
                escape_dot(label),
                color
            );
        }

        for (from, targets) in &self.edges {
            for to in targets {
                let _ = writeln!(out, "    \"{}\" -> \"{}\";", escape_dot(from), escape_dot(to));
            }
        }

        out.push_str("}\n");
        out
    }
}

fn escape_dot(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// Tests
// ============================================================================
