//! # Vigil Engine — APT candidate triage over proxy-log domain graphs
//!
//! Reduces the batch-precomputed per-user, per-feature k-NN graphs to a
//! short ranked shortlist for a human analyst. One query fuses the
//! feature graphs per user, fuses the users into an aggregate graph,
//! prunes weak edges against the similarity statistics, clusters by
//! connected components, filters and whitelists, and ranks what survives.
//! A per-session stage cache re-runs only from the first parameter that
//! changed, so interactive re-queries stay cheap.

pub mod cancel;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod index;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod ranker;
pub mod store;

mod session;

pub use cancel::CancelToken;
pub use error::{EngineError, EngineResult};
pub use index::DomainIndex;
pub use output::{ClusterView, Output, Ranking, RankingBucket};
pub use params::QueryParams;
pub use pipeline::AnalysisEngine;
pub use progress::{ProgressEvent, ProgressSink};
pub use store::{Catalog, GraphStore};
