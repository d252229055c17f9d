//! Error taxonomy for the engine boundary and the client operations built on it.
//!
//! Every failure is a tagged variant. In particular, a bounded receive that
//! expires is [`EngineError::TimedOut`] / [`RecvError::TimedOut`], which lets
//! the unbounded receive loop retry on exactly that tag and nothing else.

use thiserror::Error;

use crate::version::Version;

/// Errors reported by a bus engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("operation timed out")]
    TimedOut,

    #[error("receiver closed")]
    Closed,

    #[error("unknown session")]
    UnknownSession,

    #[error("token mismatch")]
    TokenMismatch,

    #[error("version mismatch: engine speaks {0}")]
    VersionMismatch(Version),

    #[error("identifier '{0}' conflicts with an existing bus")]
    IdentifierConflict(String),

    #[error("invalid bus identifier")]
    InvalidIdentifier,

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("memory region error: {0}")]
    Region(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Errors returned by `join`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("token mismatch")]
    TokenMismatch,

    #[error("version mismatch: engine speaks {0}")]
    VersionMismatch(Version),

    #[error("identifier '{0}' conflicts with an existing bus")]
    IdentifierConflict(String),

    #[error("invalid join options: {0}")]
    InvalidOptions(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("join timed out")]
    Timeout,

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for JoinError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TokenMismatch => Self::TokenMismatch,
            EngineError::VersionMismatch(v) => Self::VersionMismatch(v),
            EngineError::IdentifierConflict(id) => Self::IdentifierConflict(id),
            EngineError::InvalidIdentifier => {
                Self::InvalidOptions("identifier must not be empty".to_string())
            }
            EngineError::Unavailable(reason) => Self::Unavailable(reason),
            EngineError::TimedOut => Self::Timeout,
            other => Self::Engine(other),
        }
    }
}

/// Errors returned by `Sender::send`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session closed")]
    Closed,

    #[error("message rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for SendError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Closed | EngineError::UnknownSession => Self::Closed,
            err @ (EngineError::PayloadTooLarge { .. } | EngineError::Region(_)) => {
                Self::Rejected(err.to_string())
            }
            other => Self::Engine(other),
        }
    }
}

/// Errors returned by the receive operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("timed out")]
    TimedOut,

    #[error("receiver closed")]
    Closed,

    #[error(transparent)]
    Engine(EngineError),
}

impl RecvError {
    /// `true` for the one recoverable, expected failure of a bounded wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl From<EngineError> for RecvError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TimedOut => Self::TimedOut,
            EngineError::Closed | EngineError::UnknownSession => Self::Closed,
            other => Self::Engine(other),
        }
    }
}
