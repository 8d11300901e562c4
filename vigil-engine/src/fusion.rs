//! # Fusion Engine — weighted combination of domain graphs
//!
//! Two fusion passes share one entry point:
//! - `ByUsers` folds one user's F feature graphs into a single per-user
//!   graph under the feature weight vector
//! - `All` folds the per-user fused graphs into one aggregate graph,
//!   translating each per-user neighbor to its aggregate domain by name
//!
//! Edge weights accumulate linearly; a contribution is recorded only when
//! the accumulated similarity is non-zero, so zero-weighted features drop
//! out instead of materializing empty edges. Output graphs are unbounded
//! and list nodes in the iteration order of the source namespace.
//!
//! Cost is O(F * total neighbor entries): the per-node loop walks only
//! the target namespace and the neighbor lists that exist.

use std::sync::Arc;

use indexmap::IndexMap;

use vigil_core::{Domain, Graph, Neighbor, NeighborList};

use crate::cancel::CancelToken;
use crate::index::DomainIndex;

/// Which namespace a fusion pass runs over.
#[derive(Debug, Clone, Copy)]
pub enum FusionMode<'a> {
    /// Fuse one user's feature graphs over that user's domain namespace.
    ByUsers { target: &'a str },
    /// Fuse per-user graphs over the aggregate namespace. `users[i]` owns
    /// `graphs[i]`.
    All { users: &'a [String] },
}

/// Weighted fusion of `graphs` under `weights`. Returns `None` when the
/// cancel token fires; the poll sits in the per-node loop.
pub fn fuse(
    graphs: &[Graph],
    weights: &[f64],
    index: &DomainIndex,
    mode: FusionMode<'_>,
    cancel: &CancelToken,
) -> Option<Graph> {
    let mut merged = Graph::unbounded();

    match mode {
        FusionMode::ByUsers { target } => {
            let Some(universe) = index.user_domains(target) else {
                return Some(merged);
            };
            for node in universe.values() {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut accumulated: IndexMap<Arc<Domain>, f64> = IndexMap::new();
                for (graph, &weight) in graphs.iter().zip(weights) {
                    let Some(list) = graph.neighbors(node) else {
                        continue;
                    };
                    for neighbor in list.iter() {
                        let similarity = weight * neighbor.similarity
                            + accumulated.get(&neighbor.node).copied().unwrap_or(0.0);
                        if similarity != 0.0 {
                            accumulated.insert(neighbor.node.clone(), similarity);
                        }
                    }
                }
                merged.put(node.clone(), collect(accumulated));
            }
        }
        FusionMode::All { users } => {
            for (name, node) in index.aggregates() {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut accumulated: IndexMap<Arc<Domain>, f64> = IndexMap::new();
                for ((graph, user), &weight) in graphs.iter().zip(users).zip(weights) {
                    let Some(per_user) = index.user_domain(user, name) else {
                        continue;
                    };
                    let Some(list) = graph.neighbors(per_user) else {
                        continue;
                    };
                    for neighbor in list.iter() {
                        let Some(aggregate) = index.aggregate(neighbor.node.name()) else {
                            continue;
                        };
                        let similarity = weight * neighbor.similarity
                            + accumulated.get(aggregate).copied().unwrap_or(0.0);
                        if similarity != 0.0 {
                            accumulated.insert(aggregate.clone(), similarity);
                        }
                    }
                }
                merged.put(node.clone(), collect(accumulated));
            }
        }
    }

    Some(merged)
}

fn collect(accumulated: IndexMap<Arc<Domain>, f64>) -> NeighborList {
    let mut list = NeighborList::unbounded();
    for (node, similarity) in accumulated {
        list.add(Neighbor::new(node, similarity));
    }
    list
}
