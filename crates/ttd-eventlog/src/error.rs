//! Error types for the event list and the on-disk log format.
//!
//! Structured the way `commitlog::error` is: one `thiserror` enum per
//! failure surface, with `#[source]`/`#[from]` chains instead of stringly
//! context, so a caller can match on the cause.

use thiserror::Error;

/// Errors surfaced while parsing a serialized log (C10).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected end of log while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("malformed field `{field}`: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("architecture mismatch: log was recorded on {recorded}, current host is {current}")]
    ArchMismatch { recorded: String, current: String },

    #[error("diagnostic-build flag mismatch: log has diagEnabled={recorded}, current build has diagEnabled={current}")]
    DiagFlagMismatch { recorded: bool, current: bool },

    #[error("indentation underflow while parsing call-begin/end nesting")]
    IndentUnderflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced while emitting a serialized log.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
