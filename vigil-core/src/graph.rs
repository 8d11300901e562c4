//! # Domain Graph — directed weighted graph with bounded neighbor lists
//!
//! The k-NN feature graphs produced by the batch stage and every graph
//! derived from them (fused, pruned, clustered) share this one primitive:
//! - Nodes are reference-counted [`Domain`]s; node iteration order is
//!   insertion order and is semantic (component emission, ranking
//!   tie-breaks depend on it)
//! - Neighbor lists are bounded to k for feature graphs and unbounded for
//!   fusion and aggregate graphs
//! - `prune` drops weak edges but keeps isolated nodes (clustering treats
//!   them as singleton components)
//! - `connected_components` uses undirected reachability with a
//!   deterministic emission order

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::domain::Domain;

/// One directed weighted edge endpoint: the target node and a similarity.
///
/// Similarities are symmetric in intent but stored directed; an A to B
/// entry is independent of B to A.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub node: Arc<Domain>,
    pub similarity: f64,
}

impl Neighbor {
    pub fn new(node: Arc<Domain>, similarity: f64) -> Self {
        Self { node, similarity }
    }
}

/// An ordered sequence of neighbors, bounded to `k_max` entries.
///
/// Once full, a new entry only enters by evicting the current weakest
/// entry, and only if it is stronger (k-NN semantics).
#[derive(Debug, Clone)]
pub struct NeighborList {
    neighbors: Vec<Neighbor>,
    k_max: usize,
}

impl NeighborList {
    pub fn new(k_max: usize) -> Self {
        Self {
            neighbors: Vec::new(),
            k_max,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Insert under k-NN semantics. Returns false when the list is full
    /// and the candidate is not stronger than the weakest entry.
    pub fn add(&mut self, neighbor: Neighbor) -> bool {
        if self.neighbors.len() < self.k_max {
            self.neighbors.push(neighbor);
            return true;
        }
        let weakest = self
            .neighbors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, n)| (i, n.similarity));
        match weakest {
            Some((i, sim)) if neighbor.similarity > sim => {
                self.neighbors[i] = neighbor;
                true
            }
            _ => false,
        }
    }

    /// Append every entry of `other`, duplicates included.
    pub fn extend_from(&mut self, other: &NeighborList) {
        for neighbor in &other.neighbors {
            self.add(neighbor.clone());
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&Neighbor) -> bool) {
        self.neighbors.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Directed weighted graph over shared domains.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: IndexMap<Arc<Domain>, NeighborList>,
    k_max: usize,
}

impl Graph {
    pub fn new(k_max: usize) -> Self {
        Self {
            nodes: IndexMap::new(),
            k_max,
        }
    }

    /// A graph with unbounded neighbor lists (fusion and aggregate graphs).
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn put(&mut self, node: Arc<Domain>, neighbors: NeighborList) {
        self.nodes.insert(node, neighbors);
    }

    pub fn neighbors(&self, node: &Arc<Domain>) -> Option<&NeighborList> {
        self.nodes.get(node)
    }

    pub fn neighbors_mut(&mut self, node: &Arc<Domain>) -> Option<&mut NeighborList> {
        self.nodes.get_mut(node)
    }

    pub fn contains(&self, node: &Arc<Domain>) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Domain>> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Domain>, &NeighborList)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total directed edge count.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(NeighborList::len).sum()
    }

    /// Remove every edge with similarity strictly below `threshold`.
    /// Nodes left without neighbors stay in the graph as isolated keys.
    pub fn prune(&mut self, threshold: f64) {
        for list in self.nodes.values_mut() {
            list.retain(|n| n.similarity >= threshold);
        }
    }

    /// Remove a set of nodes and every edge incident to them.
    pub fn remove_all(&mut self, victims: &std::collections::HashSet<Arc<Domain>>) {
        self.nodes.retain(|node, _| !victims.contains(node));
        for list in self.nodes.values_mut() {
            list.retain(|n| !victims.contains(&n.node));
        }
    }

    /// Split into connected components, treating edges as undirected for
    /// reachability (an A to B or B to A entry suffices to connect).
    ///
    /// Components are emitted in the order their first-discovered node
    /// appears in this graph's node iteration order; inside a component,
    /// nodes keep the breadth-first traversal order.
    pub fn connected_components(&self) -> Vec<Graph> {
        let n = self.nodes.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, list) in self.nodes.values().enumerate() {
            for neighbor in list.iter() {
                if let Some(j) = self.nodes.get_index_of(&neighbor.node) {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }

        let mut visited = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut component = Graph::new(self.k_max);
            let mut queue = VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                if let Some((node, list)) = self.nodes.get_index(i) {
                    component.put(node.clone(), list.clone());
                }
                for &j in &adjacency[i] {
                    if !visited[j] {
                        visited[j] = true;
                        queue.push_back(j);
                    }
                }
            }
            components.push(component);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Arc<Domain> {
        Arc::new(Domain::new(name, "u1"))
    }

    fn edge(graph: &mut Graph, from: &Arc<Domain>, to: &Arc<Domain>, sim: f64) {
        match graph.neighbors_mut(from) {
            Some(list) => {
                list.add(Neighbor::new(to.clone(), sim));
            }
            None => {
                let mut list = NeighborList::unbounded();
                list.add(Neighbor::new(to.clone(), sim));
                graph.put(from.clone(), list);
            }
        }
        if !graph.contains(to) {
            graph.put(to.clone(), NeighborList::unbounded());
        }
    }

    fn sample_graph() -> (Graph, Vec<Arc<Domain>>) {
        let nodes: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|n| node(n)).collect();
        let mut graph = Graph::unbounded();
        edge(&mut graph, &nodes[0], &nodes[1], 0.9);
        edge(&mut graph, &nodes[1], &nodes[2], 0.5);
        edge(&mut graph, &nodes[3], &nodes[4], 0.2);
        (graph, nodes)
    }

    #[test]
    fn test_neighbor_list_bound_eviction() {
        let target = node("t");
        let mut list = NeighborList::new(2);
        assert!(list.add(Neighbor::new(target.clone(), 0.3)));
        assert!(list.add(Neighbor::new(target.clone(), 0.5)));
        // Full: weaker candidate rejected, stronger evicts the 0.3 entry.
        assert!(!list.add(Neighbor::new(target.clone(), 0.2)));
        assert!(list.add(Neighbor::new(target.clone(), 0.8)));
        let mut sims: Vec<f64> = list.iter().map(|n| n.similarity).collect();
        sims.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sims, vec![0.5, 0.8]);
    }

    #[test]
    fn test_prune_keeps_isolated_nodes() {
        let (mut graph, _) = sample_graph();
        graph.prune(0.6);
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_prune_threshold_is_inclusive() {
        let (mut graph, _) = sample_graph();
        graph.prune(0.5);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_prune_monotonicity() {
        let (graph, _) = sample_graph();
        let mut loose = graph.clone();
        let mut tight = graph.clone();
        loose.prune(0.3);
        tight.prune(0.7);
        // Every edge surviving the tight threshold survives the loose one.
        for (node, list) in tight.iter() {
            for neighbor in list.iter() {
                let kept = loose
                    .neighbors(node)
                    .map(|l| {
                        l.iter().any(|n| {
                            n.node == neighbor.node && n.similarity == neighbor.similarity
                        })
                    })
                    .unwrap_or(false);
                assert!(kept);
            }
        }
    }

    #[test]
    fn test_components_partition_nodes() {
        let (graph, _) = sample_graph();
        let components = graph.connected_components();
        let total: usize = components.iter().map(Graph::len).sum();
        assert_eq!(total, graph.len());

        let mut seen = std::collections::HashSet::new();
        for component in &components {
            for node in component.nodes() {
                assert!(seen.insert(node.name().to_string()));
            }
        }
    }

    #[test]
    fn test_components_use_undirected_reachability() {
        let (graph, _) = sample_graph();
        let components = graph.connected_components();
        // a->b->c connect into one component even though c has no out-edges.
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 3);
        assert_eq!(components[1].len(), 2);
    }

    #[test]
    fn test_component_order_is_deterministic() {
        let (graph, _) = sample_graph();
        let components = graph.connected_components();
        let first: Vec<&str> = components[0].nodes().map(|n| n.name()).collect();
        assert_eq!(first, vec!["a", "b", "c"]);
        let second: Vec<&str> = components[1].nodes().map(|n| n.name()).collect();
        assert_eq!(second, vec!["d", "e"]);
    }

    #[test]
    fn test_remove_all_drops_incident_edges() {
        let (mut graph, nodes) = sample_graph();
        let victims = std::collections::HashSet::from([nodes[1].clone()]);
        graph.remove_all(&victims);
        assert_eq!(graph.len(), 4);
        assert!(!graph.contains(&nodes[1]));
        // a's edge to b is gone with it.
        assert!(graph.neighbors(&nodes[0]).unwrap().is_empty());
    }

    #[test]
    fn test_copy_shares_domains_but_not_edges() {
        let (graph, nodes) = sample_graph();
        let mut copy = graph.clone();
        copy.prune(1.0);
        assert_eq!(graph.edge_count(), 3);
        assert!(copy.nodes().any(|n| Arc::ptr_eq(n, &nodes[0])));
    }
}
