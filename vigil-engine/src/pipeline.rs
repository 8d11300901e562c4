//! # Analysis Pipeline — staged fusion, pruning, clustering and ranking
//!
//! Drives the eight-stage computation for one session and owns the stage
//! cache:
//!
//! | Stage | Computes                                   | Re-runs on a change in |
//! |-------|--------------------------------------------|------------------------|
//! | 0     | user selection, loaded feature bundles     | target user/subnet     |
//! | 1     | per-user fused graphs, aggregate graph     | feature weights        |
//! | 2     | similarity statistics and histogram        | prune z-mode           |
//! | 3     | threshold resolution, pruning, components  | prune threshold        |
//! | 4     | cluster-size statistics and histogram      | cluster z-mode         |
//! | 5     | size-filtered cluster list                 | max cluster size       |
//! | 6     | whitelisted cluster list                   | whitelist inputs       |
//! | 7     | ranking                                    | ranking weights, APT   |
//!
//! Parameters compare field by field in dependency order; the first
//! mismatch invalidates that stage and everything after it. Queries are
//! single-threaded; cancellation is polled between stages and inside the
//! fusion, whitelist and ranking loops, leaving the cache at the last
//! fully completed stage.

use std::path::PathBuf;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use vigil_core::stats::{
    clean_histogram, from_z, histogram, max_min, mean_variance, z, Histogram,
};
use vigil_core::{subnet, Request};

use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::filter::{apply_whitelist, filter_by_size, read_whitelist};
use crate::fusion::{fuse, FusionMode};
use crate::index::DomainIndex;
use crate::output::{ClusterView, Output};
use crate::params::{QueryParams, ALL_USERS};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::ranker::rank;
use crate::session::SessionState;
use crate::store::GraphStore;

/// One analysis session over a batch input directory.
///
/// The engine is single-threaded within a query; run concurrent queries
/// on separate engines sharing nothing but the input directory. Study
/// mode skips the UI histograms and attaches the ranking to the output.
pub struct AnalysisEngine {
    store: GraphStore,
    whitelist_path: PathBuf,
    study_out: bool,
    progress: Option<ProgressSink>,
    session: SessionState,
}

impl AnalysisEngine {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        whitelist_path: impl Into<PathBuf>,
        study_out: bool,
    ) -> Self {
        Self {
            store: GraphStore::new(input_dir),
            whitelist_path: whitelist_path.into(),
            study_out,
            progress: None,
            session: SessionState::new(),
        }
    }

    /// Attach a progress sink receiving one event per completed stage.
    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Subnets first, then users, both in store order.
    pub fn get_users(&self) -> EngineResult<Vec<String>> {
        let catalog = self.store.refresh_catalog()?;
        let mut out = catalog.subnets;
        out.extend(catalog.users);
        Ok(out)
    }

    /// Requests of an aggregated domain, if the current session knows it.
    pub fn get_requests(&self, domain: &str) -> Option<Vec<Request>> {
        self.session
            .index
            .aggregate(domain)
            .map(|d| d.requests().to_vec())
    }

    /// Run the pipeline for `params`. Returns `Ok(None)` when the query
    /// is refused by validation or cancelled; either way the stage cache
    /// keeps every fully completed stage for the next query.
    pub fn analyze(
        &mut self,
        params: QueryParams,
        cancel: &CancelToken,
    ) -> EngineResult<Option<Output>> {
        let started = Instant::now();

        let catalog = self.store.catalog()?;
        if let Err(err) = params.validate(&catalog) {
            warn!(user = %params.user, %err, "query refused");
            return Ok(None);
        }

        let first_changed = match &self.session.params {
            Some(prev) => params.first_changed_stage(prev),
            None => 0,
        };
        let start_stage = first_changed.min(self.session.completed);
        debug!(first_changed, start_stage, "stage plan");

        self.session.k = self.store.k()?;
        self.session.params = Some(params.clone());
        self.session.invalidate_from(start_stage);

        // ── Stage 0: user selection and graph loading ────────────────────
        if start_stage == 0 {
            let users = self.expand_users(&params.user, &catalog);
            info!(user = %params.user, selected = users.len(), "loading feature graphs");

            let mut index = DomainIndex::new();
            let mut bundles = IndexMap::new();
            for user in &users {
                let graphs = self.store.user_graphs(user)?;
                if let Some(first) = graphs.first() {
                    for node in first.nodes() {
                        index.insert_user_domain(user, node.clone());
                    }
                }
                bundles.insert(user.clone(), graphs);
                if cancel.is_cancelled() {
                    return Ok(None);
                }
            }
            self.session.users = users;
            self.session.index = index;
            self.session.bundles = bundles;
            self.session.complete(0);
            self.emit(0, started, "data loaded");
        }

        // ── Stage 1: feature fusion, then user fusion ────────────────────
        if start_stage <= 1 {
            let users = self.session.users.clone();
            let mut user_graphs = Vec::with_capacity(users.len());
            for user in &users {
                let Some(bundle) = self.session.bundles.get(user) else {
                    continue;
                };
                let Some(fused) = fuse(
                    bundle,
                    &params.feature_weights,
                    &self.session.index,
                    FusionMode::ByUsers { target: user },
                    cancel,
                ) else {
                    return Ok(None);
                };
                user_graphs.push(fused);
            }

            let user_weights = vec![1.0; user_graphs.len()];
            let Some(merged) = fuse(
                &user_graphs,
                &user_weights,
                &self.session.index,
                FusionMode::All { users: &users },
                cancel,
            ) else {
                return Ok(None);
            };
            self.session.user_graphs = user_graphs;
            self.session.merged = Some(merged);
            self.session.complete(1);
            self.emit(1, started, "fusion of users done");
        }

        // ── Stage 2: similarity statistics ───────────────────────────────
        if start_stage <= 2 {
            let similarities = self.list_similarities();
            self.session.similarity_stats = mean_variance(&similarities);
            self.session.similarity_hist = if self.study_out {
                None
            } else {
                similarity_histogram(
                    &similarities,
                    self.session.similarity_stats,
                    params.prune_z,
                )
            };
            self.session.complete(2);
            self.emit(2, started, "similarities analyzed");
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }

        // ── Stage 3: pruning and clustering ──────────────────────────────
        if start_stage <= 3 {
            let (mean, variance) = self.session.similarity_stats;
            self.session.prune_threshold = if params.prune_z {
                from_z(mean, variance, params.prune_threshold)
            } else {
                params.prune_threshold
            };

            let Some(merged) = &self.session.merged else {
                return Err(EngineError::Internal(
                    "pruning reached without a fused graph".into(),
                ));
            };
            let mut pruned = merged.clone();
            pruned.prune(self.session.prune_threshold);
            if cancel.is_cancelled() {
                return Ok(None);
            }
            self.session.clusters = pruned.connected_components();
            self.session.complete(3);
            self.emit(3, started, "pruning and clustering done");
        }

        // ── Stage 4: cluster-size statistics ─────────────────────────────
        if start_stage <= 4 {
            let sizes: Vec<f64> = self
                .session
                .clusters
                .iter()
                .map(|c| c.len() as f64)
                .collect();
            self.session.cluster_stats = mean_variance(&sizes);
            self.session.cluster_hist = if self.study_out {
                None
            } else {
                cluster_histogram(&sizes, self.session.cluster_stats, params.cluster_z)
            };
            self.session.complete(4);
            self.emit(4, started, "cluster sizes analyzed");
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }

        // ── Stage 5: size filtering ──────────────────────────────────────
        if start_stage <= 5 {
            let (mean, variance) = self.session.cluster_stats;
            self.session.max_cluster_size = if params.cluster_z {
                from_z(mean, variance, params.max_cluster_size).round()
            } else {
                params.max_cluster_size
            };
            self.session.filtered =
                filter_by_size(&self.session.clusters, self.session.max_cluster_size);
            self.session.complete(5);
            self.emit(5, started, "filtering done");
        }

        // ── Stage 6: whitelisting ────────────────────────────────────────
        if start_stage <= 6 {
            if params.whitelist {
                let persistent = read_whitelist(&self.whitelist_path);
                let Some(outcome) = apply_whitelist(
                    &self.session.filtered,
                    &persistent,
                    &params.white_ongo,
                    params.min_requests,
                    &self.session.users,
                    &self.session.index,
                    cancel,
                ) else {
                    return Ok(None);
                };
                self.session.whitelisted = outcome.whitelisted;
                self.session.filtered_whitelisted = outcome.clusters;
            } else {
                self.session.whitelisted = Vec::new();
                self.session.filtered_whitelisted = self.session.filtered.clone();
            }
            self.session.complete(6);
            self.emit(6, started, "white listing done");
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }

        // ── Stage 7: ranking ─────────────────────────────────────────────
        if start_stage <= 7 {
            let Some(outcome) = rank(
                &self.session.filtered_whitelisted,
                &self.session.index,
                &params.ranking_weights,
                params.apt_search,
                cancel,
            )?
            else {
                return Ok(None);
            };
            self.session.ranking = outcome.ranking;
            self.session.ranking_print = outcome.print;
            self.session.complete(7);
            self.emit(7, started, "ranking done");
        }

        Ok(Some(self.build_output(&params)))
    }

    fn expand_users(&self, target: &str, catalog: &crate::store::Catalog) -> Vec<String> {
        if target == ALL_USERS {
            catalog.users.clone()
        } else if subnet::is_subnet(target) {
            subnet::users_in_subnet(target, &catalog.users)
        } else {
            vec![target.to_string()]
        }
    }

    fn list_similarities(&self) -> Vec<f64> {
        let mut similarities = Vec::new();
        if let Some(merged) = &self.session.merged {
            for (_, list) in merged.iter() {
                for neighbor in list.iter() {
                    similarities.push(neighbor.similarity);
                }
            }
        }
        similarities
    }

    /// The UI summary is rebuilt on every query from the cached stage
    /// outputs, so skipped stages still report their numbers.
    fn build_output(&self, params: &QueryParams) -> Output {
        let session = &self.session;
        let mut stdout = format!("<pre>Number of users selected: {}", session.users.len());
        stdout.push_str(&format!("<br>k-NN Graph: k: {}", session.k));
        stdout.push_str(&format!(
            "<br>Total number of domains: {}",
            session.index.total_domains()
        ));

        if params.prune_z {
            let (mean, variance) = session.similarity_stats;
            stdout.push_str("<br>Prune Threshold : ");
            stdout.push_str(&format!("<br>    Mean = {mean}"));
            stdout.push_str(&format!("<br>    Variance = {variance}"));
            stdout.push_str(&format!(
                "<br>    Prune Threshold = {}",
                session.prune_threshold
            ));
        }
        if params.cluster_z {
            let (mean, variance) = session.cluster_stats;
            stdout.push_str("<br>Cluster Size : ");
            stdout.push_str(&format!("<br>    Mean = {mean}"));
            stdout.push_str(&format!("<br>    Variance = {variance}"));
            stdout.push_str(&format!(
                "<br>    Max Cluster Size = {}",
                session.max_cluster_size
            ));
        }
        if params.whitelist {
            stdout.push_str(&format!(
                "<br>Number of white listed domains: {}",
                session.whitelisted.len()
            ));
        }

        stdout.push_str(&session.ranking_print);
        stdout.push_str(&format!(
            "<br>Found {} clusters</pre>",
            session.filtered_whitelisted.len()
        ));

        Output {
            stdout,
            filtered_clusters: (!self.study_out).then(|| {
                session
                    .filtered_whitelisted
                    .iter()
                    .map(ClusterView::from_graph)
                    .collect()
            }),
            hist_similarities: session.similarity_hist.clone(),
            hist_clusters: session.cluster_hist.clone(),
            ranking: self.study_out.then(|| session.ranking.clone()),
        }
    }

    fn emit(&self, stage: usize, started: Instant, message: &str) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(stage, elapsed_ms, message);
        if let Some(sink) = &self.progress {
            sink(&ProgressEvent {
                stage,
                elapsed_ms,
                message: message.to_string(),
            });
        }
    }
}

/// Histogram over edge similarities, windowed for the UI: raw mode clamps
/// the top edge to one standard deviation above the mean (never below
/// 1.0), z mode shows `[min, 1.0]` with a 0.5 floor at a finer step.
fn similarity_histogram(
    similarities: &[f64],
    (mean, variance): (f64, f64),
    z_mode: bool,
) -> Option<Histogram> {
    let values: Vec<f64> = if z_mode {
        similarities
            .iter()
            .map(|&x| z(mean, variance, x))
            .collect()
    } else {
        similarities.to_vec()
    };
    let (mut max, min) = max_min(&values)?;
    let step = if z_mode {
        max = max.min(1.0).max(0.5);
        0.01
    } else {
        max = max.min(from_z(mean, variance, 1.0)).max(1.0);
        0.1
    };
    Some(windowed(&values, min, max, step))
}

/// Histogram over cluster sizes: integer bins over rounded bounds.
fn cluster_histogram(
    sizes: &[f64],
    (mean, variance): (f64, f64),
    z_mode: bool,
) -> Option<Histogram> {
    let values: Vec<f64> = if z_mode {
        sizes.iter().map(|&x| z(mean, variance, x)).collect()
    } else {
        sizes.to_vec()
    };
    let (max, min) = max_min(&values)?;
    Some(windowed(&values, min.round(), max.round(), 1.0))
}

fn windowed(values: &[f64], min: f64, max: f64, step: f64) -> Histogram {
    let hist = histogram(values, min, max, step);
    if hist.len() > 3 {
        clean_histogram(hist)
    } else {
        hist
    }
}
