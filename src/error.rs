//! Error types produced by the handle layer.
//!
//! | Error | Raised | Description |
//! |-------|--------|-------------|
//! | [`Usage`](Error::Usage) | before scheduling | wrong arity, wrong argument type, malformed hex, foreign `this` |
//! | [`Closed`](Error::Closed) | task | the handle was closed (or never opened) |
//! | [`Engine`](Error::Engine) | task | the engine reported a failure |
//! | [`Marshal`](Error::Marshal) | task | the result could not be built |
//! | [`Worker`](Error::Worker) | worker | the task panicked |
//! | [`Runtime`](Error::Runtime) | before scheduling | the worker runtime could not be started |
//!
//! Usage errors are returned immediately under both calling conventions. All
//! other task errors travel the same path as a successful result: returned by
//! `*_sync` methods, passed to the completion of `*_async` methods.
use engine::EngineError;
use thiserror::Error;

pub type HmResult<T> = Result<T, Error>;

/// Argument-shape violations detected at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UsageError {
    #[error("Wrong number of arguments: expected {expected}, got {actual}")]
    WrongArity { expected: &'static str, actual: usize },

    #[error("Wrong arguments: {0}")]
    WrongArguments(String),

    #[error("<this> is not a hmsearch object")]
    NotAHandle,

    #[error("invalid hex hash {hash:?}: {reason}")]
    InvalidHash { hash: String, reason: String },

    #[error("invalid open mode {0}")]
    InvalidMode(i64),

    #[error("no such function: {0}")]
    UnknownFunction(String),
}

/// Errors surfaced by handle and module operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("database is closed")]
    Closed,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to build result: {0}")]
    Marshal(String),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

impl Error {
    /// Short machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Usage(_) => "usage",
            Error::Closed => "closed",
            Error::Engine(_) => "engine",
            Error::Marshal(_) => "marshal",
            Error::Worker(_) => "worker",
            Error::Runtime(_) => "runtime",
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_message_matches_binding() {
        assert_eq!(Error::Closed.to_string(), "database is closed");
        assert_eq!(Error::Closed.kind(), "closed");
    }

    #[test]
    fn usage_errors_convert_and_classify() {
        let err: Error = UsageError::NotAHandle.into();
        assert!(err.is_usage());
        assert_eq!(err.to_string(), "<this> is not a hmsearch object");
    }

    #[test]
    fn engine_errors_are_transparent() {
        let err: Error = EngineError::ReadOnly.into();
        assert_eq!(err.kind(), "engine");
        assert_eq!(err.to_string(), EngineError::ReadOnly.to_string());
    }
}
