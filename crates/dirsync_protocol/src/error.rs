//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding service responses and change records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The response envelope lacks continuation or record data, or is not JSON.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A single change record failed structural validation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl ProtocolError {
    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    /// Returns true if the error is scoped to a single record.
    pub fn is_record_error(&self) -> bool {
        matches!(self, ProtocolError::InvalidRecord(_))
    }
}
