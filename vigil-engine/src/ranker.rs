//! # Ranker — multi-criterion ordering of surviving domains
//!
//! The surviving clusters flatten into one aggregate graph; for each node
//! three indices are computed:
//! - `parents`: summed similarity over incoming edges
//! - `children`: summed similarity over outgoing edges
//! - `requests`: number of requests observed for the domain
//!
//! The combined index is the weighted sum under the ranking weight
//! vector; domains sort descending, ties keeping insertion order. When a
//! domain's neighbor list is unioned across overlapping clusters,
//! duplicate entries are kept and inflate the sums.

use std::sync::Arc;

use indexmap::IndexMap;

use vigil_core::stats::sort_by_index;
use vigil_core::{Domain, Graph};

use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::index::DomainIndex;
use crate::output::{Ranking, RankingBucket};

pub struct RankingOutcome {
    pub ranking: Ranking,
    /// HTML fragment listing the ranking and the optional APT report.
    pub print: String,
}

/// Rank the domains of `clusters`. Returns `Ok(None)` on cancellation.
pub fn rank(
    clusters: &[Graph],
    index: &DomainIndex,
    weights: &[f64; 3],
    apt_search: bool,
    cancel: &CancelToken,
) -> EngineResult<Option<RankingOutcome>> {
    // Flatten into one graph, merging neighbor lists by union.
    let mut flat = Graph::unbounded();
    for cluster in clusters {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        for (node, list) in cluster.iter() {
            match flat.neighbors_mut(node) {
                Some(existing) => existing.extend_from(list),
                None => flat.put(node.clone(), list.clone()),
            }
        }
    }

    let mut parents: IndexMap<Arc<Domain>, f64> = IndexMap::new();
    let mut children: IndexMap<Arc<Domain>, f64> = IndexMap::new();
    for node in flat.nodes() {
        parents.insert(node.clone(), 0.0);
        children.insert(node.clone(), 0.0);
    }
    for (node, list) in flat.iter() {
        for neighbor in list.iter() {
            if let Some(sum) = children.get_mut(node) {
                *sum += neighbor.similarity;
            }
            let into = parents.get_mut(&neighbor.node).ok_or_else(|| {
                EngineError::Internal(format!(
                    "neighbor {} is not a node of the ranking graph",
                    neighbor.node.name()
                ))
            })?;
            *into += neighbor.similarity;
        }
    }

    let combined: IndexMap<Arc<Domain>, f64> = flat
        .nodes()
        .map(|node| {
            let value = weights[0] * parents.get(node).copied().unwrap_or(0.0)
                + weights[1] * children.get(node).copied().unwrap_or(0.0)
                + weights[2] * node.request_count() as f64;
            (node.clone(), value)
        })
        .collect();

    let nodes: Vec<Arc<Domain>> = flat.nodes().cloned().collect();
    let sorted = sort_by_index(&nodes, |node| {
        combined.get(node).copied().unwrap_or(0.0)
    });

    let mut print = format!("<br>Number of domains shown: {}", sorted.len());
    if apt_search {
        print.push_str(&apt_report(&sorted, &combined, index.total_domains()));
    }

    print.push_str("<br>Ranking:");
    let mut ranking: Ranking = Vec::new();
    for node in &sorted {
        let value = combined.get(node).copied().unwrap_or(0.0);
        print.push_str(&format!("<br>    ({:.2}) {}", value, node.name()));
        match ranking.last_mut() {
            Some(bucket) if bucket.index.to_bits() == value.to_bits() => {
                bucket.domains.push(node.name().to_string());
            }
            _ => ranking.push(RankingBucket {
                index: value,
                domains: vec![node.name().to_string()],
            }),
        }
    }

    Ok(Some(RankingOutcome { ranking, print }))
}

/// Positions of `.apt`-labeled domains in the sorted list. The TOP
/// percentile of the worst-ranked one is its one-based position over the
/// total aggregate domain count.
fn apt_report(
    sorted: &[Arc<Domain>],
    combined: &IndexMap<Arc<Domain>, f64>,
    total_domains: usize,
) -> String {
    let mut worst_position = 0usize;
    let mut apt_domains = Vec::new();
    for (position, node) in sorted.iter().enumerate() {
        if node.name().ends_with(".apt") {
            worst_position = position + 1;
            apt_domains.push(node.clone());
        }
    }

    if apt_domains.is_empty() {
        return "<br>TOP for APT: NOT FOUND".to_string();
    }

    let percentile = worst_position as f64 / total_domains as f64 * 100.0;
    let mut out = format!("<br>TOP for first APT: {percentile:.2}%");
    out.push_str(&format!(
        "<br>Number of APT domains : {}",
        apt_domains.len()
    ));
    out.push_str("<br>APT domains : ");
    for node in &apt_domains {
        let value = combined.get(node).copied().unwrap_or(0.0);
        out.push_str(&format!("<br>    ({:.2}) {}", value, node.name()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{Neighbor, NeighborList, Request};

    fn request(url: &str) -> Request {
        Request {
            time: 0,
            elapsed: 1,
            client: "u1".into(),
            code: 200,
            method: "GET".into(),
            url: url.into(),
            bytes: 64,
            peer_status: "DIRECT".into(),
            peer_host: "203.0.113.2".into(),
            content_type: "text/plain".into(),
        }
    }

    fn domain(name: &str, requests: usize) -> Arc<Domain> {
        let mut d = Domain::new(name, "u1");
        for i in 0..requests {
            d.push_request(request(&format!("/{i}")));
        }
        Arc::new(d)
    }

    fn indexed(domains: &[Arc<Domain>]) -> DomainIndex {
        let mut index = DomainIndex::new();
        for d in domains {
            index.insert_user_domain("u1", d.clone());
        }
        index
    }

    /// a -> b (0.4) in one cluster, isolated c in another.
    fn clusters() -> (Vec<Graph>, Vec<Arc<Domain>>) {
        let a = domain("a.example.com", 2);
        let b = domain("b.example.com", 1);
        let c = domain("c.example.com", 1);

        let mut first = Graph::unbounded();
        let mut list = NeighborList::unbounded();
        list.add(Neighbor::new(b.clone(), 0.4));
        first.put(a.clone(), list);
        first.put(b.clone(), NeighborList::unbounded());

        let mut second = Graph::unbounded();
        second.put(c.clone(), NeighborList::unbounded());

        (vec![first, second], vec![a, b, c])
    }

    #[test]
    fn test_children_weight_ranks_sources_first() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let outcome = rank(&clusters, &index, &[0.0, 1.0, 0.0], false, &CancelToken::new())
            .unwrap()
            .unwrap();

        assert_eq!(outcome.ranking.len(), 2);
        assert_eq!(outcome.ranking[0].index, 0.4);
        assert_eq!(outcome.ranking[0].domains, vec!["a.example.com"]);
        // b and c tie at zero in insertion order.
        assert_eq!(outcome.ranking[1].domains, vec!["b.example.com", "c.example.com"]);
    }

    #[test]
    fn test_parents_weight_ranks_targets_first() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let outcome = rank(&clusters, &index, &[1.0, 0.0, 0.0], false, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(outcome.ranking[0].domains, vec!["b.example.com"]);
    }

    #[test]
    fn test_request_weight_counts_requests() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let outcome = rank(&clusters, &index, &[0.0, 0.0, 1.0], false, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(outcome.ranking[0].index, 2.0);
        assert_eq!(outcome.ranking[0].domains, vec!["a.example.com"]);
    }

    #[test]
    fn test_tie_break_keeps_insertion_order() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let outcome = rank(&clusters, &index, &[0.0, 1.0, 0.0], false, &CancelToken::new())
            .unwrap()
            .unwrap();
        // Reversing the cluster order flips the tied bucket, nothing else.
        let reversed: Vec<Graph> = clusters.iter().rev().cloned().collect();
        let flipped = rank(&reversed, &index, &[0.0, 1.0, 0.0], false, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(outcome.ranking[1].domains, vec!["b.example.com", "c.example.com"]);
        assert_eq!(flipped.ranking[1].domains, vec!["c.example.com", "b.example.com"]);
    }

    #[test]
    fn test_apt_report_lists_positions() {
        let good = domain("good.example.com", 5);
        let evil = domain("evil.apt", 3);
        let other = domain("other.example.com", 1);
        let mut cluster = Graph::unbounded();
        for d in [&good, &evil, &other] {
            cluster.put(d.clone(), NeighborList::unbounded());
        }
        let index = indexed(&[good, evil, other]);

        let outcome = rank(
            &[cluster],
            &index,
            &[0.0, 0.0, 1.0],
            true,
            &CancelToken::new(),
        )
        .unwrap()
        .unwrap();
        // evil.apt ranks second of three aggregate domains.
        assert!(outcome.print.contains("TOP for first APT: 66.67%"));
        assert!(outcome.print.contains("Number of APT domains : 1"));
        assert!(outcome.print.contains("(3.00) evil.apt"));
    }

    #[test]
    fn test_apt_report_absent_when_unlabeled() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let outcome = rank(&clusters, &index, &[0.0, 1.0, 0.0], true, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert!(outcome.print.contains("TOP for APT: NOT FOUND"));
    }

    #[test]
    fn test_cancel_aborts_ranking() {
        let (clusters, domains) = clusters();
        let index = indexed(&domains);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(rank(&clusters, &index, &[0.0, 1.0, 0.0], false, &cancel)
            .unwrap()
            .is_none());
    }
}
