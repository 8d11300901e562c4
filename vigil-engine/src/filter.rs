//! Cluster-size filtering and whitelist suppression.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use vigil_core::{Domain, Graph};

use crate::cancel::CancelToken;
use crate::index::DomainIndex;

/// Keep every cluster whose node count does not exceed `max_size`
/// (boundary inclusive).
pub fn filter_by_size(clusters: &[Graph], max_size: f64) -> Vec<Graph> {
    clusters
        .iter()
        .filter(|cluster| cluster.len() as f64 <= max_size)
        .cloned()
        .collect()
}

/// Read the persistent whitelist: UTF-8, one domain per line, taken
/// literally. A missing or unreadable file logs and yields an empty list;
/// the query proceeds.
pub fn read_whitelist(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(err) => {
            warn!(path = %path.display(), %err, "whitelist not readable, using empty list");
            Vec::new()
        }
    }
}

pub struct WhitelistOutcome {
    /// Clusters with whitelisted nodes and their incident edges removed.
    pub clusters: Vec<Graph>,
    /// Suppressed domains, in discovery order.
    pub whitelisted: Vec<Arc<Domain>>,
}

/// Suppress whitelisted and under-the-request-floor domains.
///
/// A domain is suppressed when its name is in the union of the persistent
/// and on-the-go lists, or when any single selected user contacted it
/// fewer than `min_requests` times. Clusters are deep-cloned; the inputs
/// stay untouched for the stage cache.
pub fn apply_whitelist(
    clusters: &[Graph],
    persistent: &[String],
    ongoing: &str,
    min_requests: f64,
    users: &[String],
    index: &DomainIndex,
    cancel: &CancelToken,
) -> Option<WhitelistOutcome> {
    let names: HashSet<&str> = persistent
        .iter()
        .map(String::as_str)
        .chain(ongoing.split('\n'))
        .collect();

    let mut suppressed: IndexMap<String, Arc<Domain>> = IndexMap::new();
    let mut out = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        if cancel.is_cancelled() {
            return None;
        }
        let mut cluster = cluster.clone();
        let mut victims: HashSet<Arc<Domain>> = HashSet::new();

        for node in cluster.nodes() {
            if names.contains(node.name()) && !suppressed.contains_key(node.name()) {
                suppressed.insert(node.name().to_string(), node.clone());
                victims.insert(node.clone());
            }
            for user in users {
                if let Some(per_user) = index.user_domain(user, node.name()) {
                    if (per_user.request_count() as f64) < min_requests
                        && !suppressed.contains_key(node.name())
                    {
                        suppressed.insert(node.name().to_string(), node.clone());
                        victims.insert(node.clone());
                    }
                }
            }
        }

        cluster.remove_all(&victims);
        out.push(cluster);
    }

    Some(WhitelistOutcome {
        clusters: out,
        whitelisted: suppressed.into_values().collect(),
    })
}
