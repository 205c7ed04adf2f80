/// Error types for LiveCollection
use crate::record::RecordId;
use thiserror::Error;

/// Errors raised by collections, views and their configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The filter specification is neither a predicate nor an attribute map.
    #[error("invalid filter specification: expected a predicate or an attribute map, got {kind}")]
    InvalidFilter { kind: String },

    /// The operation is not valid in the current configuration
    /// (e.g. sorting without an ordering rule).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("index {index} out of range [0, {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("record {0} not found")]
    UnknownRecord(RecordId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::OutOfRange { index: 5, len: 3 };
        assert_eq!(err.to_string(), "index 5 out of range [0, 3)");

        let err = Error::InvalidFilter { kind: "number".to_string() };
        assert!(err.to_string().contains("got number"));

        let err = Error::InvalidOperation("cannot sort without an ordering rule".to_string());
        assert!(err.to_string().starts_with("invalid operation"));
    }
}
