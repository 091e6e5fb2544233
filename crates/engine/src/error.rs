//! Error types produced by the engine crate.
//!
//! Every failure the engine reports carries a human-readable message; callers
//! above the engine treat these as opaque "engine errors" and surface them to
//! whoever issued the operation.
use thiserror::Error;

/// Errors reported by a [`SearchEngine`](crate::SearchEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// Engine parameters rejected at init or found inconsistent at open.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    /// A hash does not match the configured hash size.
    #[error("invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },
    /// Write attempted on a database opened read-only.
    #[error("database is opened read-only")]
    ReadOnly,
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// Filesystem failure outside the storage backend.
    #[error("i/o error: {0}")]
    Io(String),
    /// Persisted state could not be interpreted.
    #[error("corrupt database: {0}")]
    Corrupt(String),
}

impl EngineError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
