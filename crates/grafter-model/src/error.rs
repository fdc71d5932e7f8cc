//! Parse errors for records and lines.

/// A malformed raw record, list line or dictionary line.
///
/// Always recoverable: callers log it and skip the record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("invalid vertex id: {0:?}")]
    InvalidId(String),

    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Record(String),
}
