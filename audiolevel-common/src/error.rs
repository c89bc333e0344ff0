//! Common error types shared across the AudioLevel crates

use thiserror::Error;

/// Common result type for AudioLevel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared between the control-plane library and its binary.
///
/// Component-specific errors (Runner, Executor, Evaluator, ...) wrap their
/// own `thiserror` enums and convert into this one at the seams where they
/// cross into shared plumbing (the queue, the KV store, the HTTP layer).
#[derive(Error, Debug)]
pub enum Error {
    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}
