//! # Vigil Core — Domain graph primitive and statistics
//!
//! Building blocks shared by the analysis engine and the study tooling:
//! - The proxy-log data model (`Request`, `Domain`)
//! - A directed weighted graph of domains with bounded neighbor lists,
//!   pruning and undirected connected-component clustering
//! - Statistics utilities (mean/variance, z-score conversions, histogram
//!   binning, stable index sort)
//! - IPv4 subnet targeting helpers

pub mod domain;
pub mod graph;
pub mod request;
pub mod stats;
pub mod subnet;

pub use domain::Domain;
pub use graph::{Graph, Neighbor, NeighborList};
pub use request::Request;
pub use stats::Histogram;
