//! # Graph Store — serialized per-user feature graphs
//!
//! The batch collaborator precomputes one k-NN graph per user per feature
//! and serializes them under a single input directory:
//! - `users.ser` / `subnets.ser`: ordered identifier lists
//! - `k.ser`: the common k used during batch k-NN
//! - `<user>_<f>.ser` for `f` in `0..F`: one feature graph per file
//!
//! Graph files hold a node table plus edges by node index; an index
//! outside the table is an invariant violation and fails the load loudly.
//! Readers re-intern domains so that all F graphs of one user share the
//! same domain allocations.
//!
//! The users/subnets catalog is read-mostly and shared across queries, so
//! it sits behind a `parking_lot::RwLock`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use vigil_core::{Domain, Graph, Neighbor, NeighborList};

use crate::error::{EngineError, EngineResult};

const USERS_FILE: &str = "users.ser";
const SUBNETS_FILE: &str = "subnets.ser";
const K_FILE: &str = "k.ser";

/// The users and subnets known to one batch run. Subnets come first in
/// the combined listing shown to callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub users: Vec<String>,
    pub subnets: Vec<String>,
}

/// On-disk form of one feature graph: node table plus index edges.
#[derive(Serialize, Deserialize)]
struct StoredGraph {
    k: usize,
    nodes: Vec<StoredNode>,
}

#[derive(Serialize, Deserialize)]
struct StoredNode {
    domain: Domain,
    /// (index into `nodes`, similarity) pairs.
    neighbors: Vec<(u32, f64)>,
}

/// Reader (and, for the batch contract, writer) over one input directory.
pub struct GraphStore {
    input_dir: PathBuf,
    catalog: RwLock<Option<Catalog>>,
}

impl GraphStore {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            catalog: RwLock::new(None),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// The cached catalog, reading it from disk on first use.
    pub fn catalog(&self) -> EngineResult<Catalog> {
        if let Some(catalog) = self.catalog.read().as_ref() {
            return Ok(catalog.clone());
        }
        self.refresh_catalog()
    }

    /// Re-read the catalog from disk and replace the cached copy.
    pub fn refresh_catalog(&self) -> EngineResult<Catalog> {
        info!(dir = %self.input_dir.display(), "reading users and subnets from disk");
        let users: Vec<String> = self.read_file(USERS_FILE)?;
        let subnets: Vec<String> = self.read_file(SUBNETS_FILE)?;
        let catalog = Catalog { users, subnets };
        *self.catalog.write() = Some(catalog.clone());
        Ok(catalog)
    }

    /// The common k of the batch k-NN stage.
    pub fn k(&self) -> EngineResult<usize> {
        self.read_file(K_FILE)
    }

    /// Load one user's ordered feature-graph bundle. All graphs share the
    /// same interned domain allocations; feature 0 defines the request
    /// payloads.
    pub fn user_graphs(&self, user: &str) -> EngineResult<Vec<Graph>> {
        let mut graphs = Vec::new();
        let mut interned: IndexMap<String, Arc<Domain>> = IndexMap::new();

        for feature in 0.. {
            let path = self.input_dir.join(format!("{user}_{feature}.ser"));
            if !path.exists() {
                break;
            }
            let stored: StoredGraph = read_bincode(&path)?;

            let nodes: Vec<Arc<Domain>> = stored
                .nodes
                .iter()
                .map(|stored_node| {
                    interned
                        .entry(stored_node.domain.name().to_string())
                        .or_insert_with(|| Arc::new(stored_node.domain.clone()))
                        .clone()
                })
                .collect();

            let mut graph = Graph::new(stored.k);
            for (stored_node, node) in stored.nodes.iter().zip(&nodes) {
                let mut list = NeighborList::new(stored.k);
                for &(target, similarity) in &stored_node.neighbors {
                    let target = nodes.get(target as usize).ok_or_else(|| {
                        EngineError::Internal(format!(
                            "neighbor index {target} out of range in {}",
                            path.display()
                        ))
                    })?;
                    list.add(Neighbor::new(target.clone(), similarity));
                }
                graph.put(node.clone(), list);
            }
            graphs.push(graph);
        }

        if graphs.is_empty() {
            error!(user, dir = %self.input_dir.display(), "no feature graphs on disk");
            return Err(EngineError::Store(format!(
                "no feature graphs for user {user}"
            )));
        }
        Ok(graphs)
    }

    fn read_file<T: for<'de> Deserialize<'de>>(&self, name: &str) -> EngineResult<T> {
        read_bincode(&self.input_dir.join(name))
    }

    // ── Writers (batch contract) ─────────────────────────────────────────

    pub fn write_catalog(dir: &Path, catalog: &Catalog) -> EngineResult<()> {
        write_bincode(&dir.join(USERS_FILE), &catalog.users)?;
        write_bincode(&dir.join(SUBNETS_FILE), &catalog.subnets)
    }

    pub fn write_k(dir: &Path, k: usize) -> EngineResult<()> {
        write_bincode(&dir.join(K_FILE), &k)
    }

    /// Serialize one user's feature-graph bundle, one file per feature.
    pub fn write_user_graphs(dir: &Path, user: &str, graphs: &[Graph]) -> EngineResult<()> {
        for (feature, graph) in graphs.iter().enumerate() {
            let positions: IndexMap<&str, u32> = graph
                .nodes()
                .enumerate()
                .map(|(i, node)| (node.name(), i as u32))
                .collect();

            let mut nodes = Vec::with_capacity(graph.len());
            for (node, list) in graph.iter() {
                let mut neighbors = Vec::with_capacity(list.len());
                for neighbor in list.iter() {
                    let target =
                        positions.get(neighbor.node.name()).copied().ok_or_else(|| {
                            EngineError::Internal(format!(
                                "neighbor {} of {} is not a node of the graph",
                                neighbor.node.name(),
                                node.name()
                            ))
                        })?;
                    neighbors.push((target, neighbor.similarity));
                }
                nodes.push(StoredNode {
                    domain: (**node).clone(),
                    neighbors,
                });
            }

            let stored = StoredGraph {
                k: graph.k_max(),
                nodes,
            };
            write_bincode(&dir.join(format!("{user}_{feature}.ser")), &stored)?;
        }
        Ok(())
    }
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> EngineResult<T> {
    let file = File::open(path).map_err(|err| {
        error!(path = %path.display(), %err, "graph store read failed");
        EngineError::Store(format!("cannot open {}: {err}", path.display()))
    })?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let file = File::create(path)?;
    Ok(bincode::serialize_into(BufWriter::new(file), value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(name: &str, client: &str) -> Arc<Domain> {
        Arc::new(Domain::new(name, client))
    }

    fn bundle() -> Vec<Graph> {
        let a = domain("a.example.com", "u1");
        let b = domain("b.example.com", "u1");

        let mut f0 = Graph::new(3);
        let mut list = NeighborList::new(3);
        list.add(Neighbor::new(b.clone(), 0.8));
        f0.put(a.clone(), list);
        f0.put(b.clone(), NeighborList::new(3));

        let mut f1 = Graph::new(3);
        f1.put(a, NeighborList::new(3));
        let mut list = NeighborList::new(3);
        list.add(Neighbor::new(f1.nodes().next().unwrap().clone(), 0.4));
        f1.put(b, list);

        vec![f0, f1]
    }

    #[test]
    fn test_round_trip_preserves_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog {
            users: vec!["u1".into()],
            subnets: vec!["10.0.0.0/24".into()],
        };
        GraphStore::write_catalog(dir.path(), &catalog).unwrap();
        GraphStore::write_k(dir.path(), 3).unwrap();
        GraphStore::write_user_graphs(dir.path(), "u1", &bundle()).unwrap();

        let store = GraphStore::new(dir.path());
        assert_eq!(store.k().unwrap(), 3);
        assert_eq!(store.catalog().unwrap().users, vec!["u1"]);

        let graphs = store.user_graphs("u1").unwrap();
        assert_eq!(graphs.len(), 2);
        assert_eq!(graphs[0].len(), 2);

        let a = graphs[0].nodes().next().unwrap().clone();
        let neighbors = graphs[0].neighbors(&a).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors.iter().next().unwrap().similarity, 0.8);
    }

    #[test]
    fn test_bundle_shares_domain_allocations() {
        let dir = tempfile::tempdir().unwrap();
        GraphStore::write_user_graphs(dir.path(), "u1", &bundle()).unwrap();

        let graphs = GraphStore::new(dir.path()).user_graphs("u1").unwrap();
        let a0 = graphs[0].nodes().next().unwrap();
        let a1 = graphs[1].nodes().next().unwrap();
        assert!(Arc::ptr_eq(a0, a1));
    }

    #[test]
    fn test_missing_user_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path());
        assert!(matches!(
            store.user_graphs("ghost"),
            Err(EngineError::Store(_))
        ));
    }

    #[test]
    fn test_corrupt_neighbor_index_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let stored = StoredGraph {
            k: 2,
            nodes: vec![StoredNode {
                domain: Domain::new("a.example.com", "u1"),
                neighbors: vec![(7, 0.5)],
            }],
        };
        write_bincode(&dir.path().join("u1_0.ser"), &stored).unwrap();

        let store = GraphStore::new(dir.path());
        assert!(matches!(
            store.user_graphs("u1"),
            Err(EngineError::Internal(_))
        ));
    }
}
