//! Crate-wide error types.
//!
//! Each subsystem keeps its own `thiserror` enum close to where the errors
//! originate (`store::StoreError`, `config::ConfigError`); this module holds
//! only the top-level `EngineError` that callers of the public API see,
//! folding subsystem errors in via `#[from]`.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}
