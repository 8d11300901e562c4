//! # Vigil Study — detection-performance reduction
//!
//! Turns a ranking produced in study mode into a ROC curve against the
//! ground-truth convention that domain names ending in `.apt` are
//! positives.

pub mod roc;

pub use roc::{compute_roc, export_roc, make_roc};
