use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure kinds of the analysis engine.
///
/// Validation refusals and cooperative cancellation are not errors: the
/// query surface reports them as an absent result. Everything here aborts
/// the query.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid query: {0}")]
    Validation(String),

    #[error("graph store failure: {0}")]
    Store(String),

    #[error("invariant violation: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),
}
