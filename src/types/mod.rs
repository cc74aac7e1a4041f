#![forbid(unsafe_code)]

//! Scalar types, key ranges and the crate-wide error type shared by the
//! rewrite engine and the storage executors.

use std::io;

use thiserror::Error;

mod range;
mod value;

pub use range::{ColumnsInterval, KeyInterval, KeyRange, MAX_KEY};
pub use value::{DataType, Value};

/// Tag set attached to a series: ordered so equal sets compare equal.
pub type Tags = std::collections::BTreeMap<String, String>;

/// Errors raised while compiling plans or executing storage operations.
#[derive(Debug, Error)]
pub enum PolyError {
    /// Missing, blank or conflicting engine configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raw I/O failure.
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    /// A storage task failed; `source` carries the collaborator's cause.
    #[error("execute {op} task failure")]
    Task {
        /// Logical operation that failed (`project`, `insert`, ...).
        op: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<PolyError>,
    },
    /// A discovered file has no recoverable metadata.
    #[error("schema inconsistency: {0}")]
    SchemaInconsistency(String),
    /// A data view violates its bitmap/value invariants.
    #[error("invalid data view: {0}")]
    InvalidDataView(String),
    /// A rewrite rule produced a tree that breaks a plan invariant.
    #[error("rule '{rule}' violated a plan invariant: {reason}")]
    RewriteInvariant {
        /// Name of the offending rule (or `optimizer` for loop-level failures).
        rule: &'static str,
        /// Human-readable description of the violation.
        reason: String,
    },
    /// Caller supplied an argument the engine cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The engine or collaborator has been closed.
    #[error("storage engine closed")]
    Closed,
}

impl PolyError {
    /// Wraps `source` as the cause of a failed storage task.
    pub fn task(op: &'static str, source: PolyError) -> Self {
        PolyError::Task {
            op,
            source: Box::new(source),
        }
    }

    /// Builds a [`PolyError::RewriteInvariant`].
    pub fn rewrite(rule: &'static str, reason: impl Into<String>) -> Self {
        PolyError::RewriteInvariant {
            rule,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PolyError {
    fn from(err: serde_json::Error) -> Self {
        PolyError::Serialization(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PolyError>;
