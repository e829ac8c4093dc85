//! Error types for httplog
//!
//! Only configuration construction can fail. Everything that happens while an
//! exchange is in flight degrades to "log less" and is reported through
//! `tracing` instead of being returned to the caller.

use thiserror::Error;

/// Result type alias for httplog operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while building a [`LoggingConfig`](crate::LoggingConfig)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A JSON path expression could not be parsed
    #[error("invalid json path `{path}`: {reason}")]
    InvalidPath {
        /// The offending expression
        path: String,
        /// What went wrong
        reason: String,
    },

    /// A route pattern could not be parsed
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// What went wrong
        reason: String,
    },

    /// A mask strategy string could not be parsed
    #[error("invalid mask strategy `{0}` (expected `full`, `remove` or `partial:N`)")]
    InvalidStrategy(String),

    /// A textual rule could not be parsed
    #[error("invalid redaction rule `{rule}`: {reason}")]
    InvalidRule {
        /// The offending rule
        rule: String,
        /// What went wrong
        reason: String,
    },

    /// Any other configuration problem
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned by a [`LogSink`](crate::LogSink) that failed to emit a record
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink has no room left for the record
    #[error("log sink is full")]
    Full,

    /// The record could not be serialized
    #[error("failed to serialize exchange record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink's transport failed
    #[error("log sink failed: {0}")]
    Failed(String),
}
