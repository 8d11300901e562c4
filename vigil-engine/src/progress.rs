//! Stage progress events for interactive callers.

use std::sync::Arc;

/// Emitted after each pipeline stage completes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressEvent {
    /// Pipeline stage index (0..=7).
    pub stage: usize,
    /// Milliseconds since the query started.
    pub elapsed_ms: u64,
    /// Short human-readable description of what finished.
    pub message: String,
}

/// Injected progress callback.
pub type ProgressSink = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
