//! Per-session state: the stage cache driving incremental re-queries.
//!
//! One slot per pipeline stage holds that stage's output; `completed`
//! counts the leading stages whose outputs are valid for `params`. The
//! pipeline controller is the sole writer. On a parameter change the
//! controller re-runs from the first affected stage and everything after
//! it; earlier outputs are reused as-is. A cancelled query leaves
//! `completed` at the last fully finished stage, so re-issuing the same
//! query resumes instead of starting over.

use std::sync::Arc;

use indexmap::IndexMap;

use vigil_core::{Domain, Graph, Histogram};

use crate::index::DomainIndex;
use crate::output::Ranking;
use crate::params::QueryParams;

#[derive(Default)]
pub(crate) struct SessionState {
    /// Parameters the cached stage outputs were computed for.
    pub params: Option<QueryParams>,
    /// Number of leading stages whose cached outputs are valid.
    pub completed: usize,

    // Stage 0: selection and loaded inputs.
    pub k: usize,
    pub users: Vec<String>,
    pub bundles: IndexMap<String, Vec<Graph>>,
    pub index: DomainIndex,

    // Stage 1: fused graphs.
    pub user_graphs: Vec<Graph>,
    pub merged: Option<Graph>,

    // Stage 2: similarity statistics.
    pub similarity_stats: (f64, f64),
    pub similarity_hist: Option<Histogram>,

    // Stage 3: pruning and clustering.
    pub prune_threshold: f64,
    pub clusters: Vec<Graph>,

    // Stage 4: cluster-size statistics.
    pub cluster_stats: (f64, f64),
    pub cluster_hist: Option<Histogram>,

    // Stage 5: size filtering.
    pub max_cluster_size: f64,
    pub filtered: Vec<Graph>,

    // Stage 6: whitelisting.
    pub whitelisted: Vec<Arc<Domain>>,
    pub filtered_whitelisted: Vec<Graph>,

    // Stage 7: ranking.
    pub ranking: Ranking,
    pub ranking_print: String,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop validity of `stage` and everything after it.
    pub fn invalidate_from(&mut self, stage: usize) {
        self.completed = self.completed.min(stage);
    }

    /// Mark `stage` as the latest fully completed stage.
    pub fn complete(&mut self, stage: usize) {
        self.completed = stage + 1;
    }
}
