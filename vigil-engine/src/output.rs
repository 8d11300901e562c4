//! Query output payloads for the transport layer.

use serde::{Deserialize, Serialize};

use vigil_core::{Graph, Histogram};

/// Domains sharing one combined index value, in ranking order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingBucket {
    pub index: f64,
    pub domains: Vec<String>,
}

/// Index buckets in descending index order.
pub type Ranking = Vec<RankingBucket>;

/// Result of one `analyze` query.
///
/// UI mode carries the surviving clusters and both histograms for the
/// front end; study mode carries the ranking for ROC computation. The
/// accumulated `stdout` fragment is always present.
#[derive(Debug, Clone, Serialize)]
pub struct Output {
    /// HTML fragment summarizing the run.
    pub stdout: String,
    pub filtered_clusters: Option<Vec<ClusterView>>,
    pub hist_similarities: Option<Histogram>,
    pub hist_clusters: Option<Histogram>,
    pub ranking: Option<Ranking>,
}

impl Output {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A cluster flattened for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub domains: Vec<DomainSummary>,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainSummary {
    pub name: String,
    pub requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

impl ClusterView {
    pub fn from_graph(graph: &Graph) -> Self {
        let mut domains = Vec::with_capacity(graph.len());
        let mut edges = Vec::new();
        for (node, list) in graph.iter() {
            domains.push(DomainSummary {
                name: node.name().to_string(),
                requests: node.request_count(),
            });
            for neighbor in list.iter() {
                edges.push(EdgeView {
                    source: node.name().to_string(),
                    target: neighbor.node.name().to_string(),
                    weight: neighbor.similarity,
                });
            }
        }
        Self { domains, edges }
    }
}
