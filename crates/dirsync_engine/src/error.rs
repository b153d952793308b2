//! Error types for the sync engine.

use dirsync_protocol::{ProtocolError, RejectionKind};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or connectivity failure on a remote call.
    #[error("transport error: {0}")]
    Transport(String),

    /// The bearer credential was rejected as stale.
    #[error("credential expired: {0}")]
    AuthExpired(String),

    /// Non-retryable service error.
    #[error("request rejected ({kind}): {code}: {message}")]
    Rejected {
        /// Rejection category.
        kind: RejectionKind,
        /// Service fault code.
        code: String,
        /// Service message.
        message: String,
    },

    /// Response missing continuation or record data.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A single record failed validation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Credential acquisition failed.
    #[error("credential acquisition failed: {0}")]
    Credential(String),

    /// Continuation or replica store failure.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The loop was asked to stop.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a rejection error.
    pub fn rejected(kind: RejectionKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if the credential should be re-acquired and the call retried.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SyncError::AuthExpired(_))
    }

    /// Returns true if the error concerns one record only.
    ///
    /// Record errors are logged and the record skipped; siblings in the batch
    /// and the token advance are unaffected.
    pub fn is_record_error(&self) -> bool {
        matches!(self, SyncError::InvalidRecord(_))
    }

    /// Returns true if the error fails the whole cycle and triggers backoff.
    pub fn is_cycle_error(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_)
                | SyncError::AuthExpired(_)
                | SyncError::Rejected { .. }
                | SyncError::MalformedResponse(_)
                | SyncError::Credential(_)
        )
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed(message) => SyncError::MalformedResponse(message),
            ProtocolError::InvalidRecord(message) => SyncError::InvalidRecord(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_scopes() {
        assert!(SyncError::AuthExpired("stale".into()).is_auth_expired());
        assert!(SyncError::AuthExpired("stale".into()).is_cycle_error());
        assert!(SyncError::Transport("reset".into()).is_cycle_error());
        assert!(SyncError::rejected(RejectionKind::Throttled, "Request_ThrottledTemporarily", "")
            .is_cycle_error());
        assert!(SyncError::InvalidRecord("missing objectId".into()).is_record_error());
        assert!(!SyncError::InvalidRecord("missing objectId".into()).is_cycle_error());
        assert!(!SyncError::Cancelled.is_cycle_error());
    }

    #[test]
    fn protocol_errors_map_to_scopes() {
        let err: SyncError = ProtocolError::malformed("missing changes").into();
        assert!(matches!(err, SyncError::MalformedResponse(_)));

        let err: SyncError = ProtocolError::invalid_record("missing discriminator").into();
        assert!(err.is_record_error());
    }

    #[test]
    fn error_display() {
        let err = SyncError::rejected(
            RejectionKind::Permission,
            "Authorization_RequestDenied",
            "Insufficient privileges",
        );
        let msg = err.to_string();
        assert!(msg.contains("permission"));
        assert!(msg.contains("Authorization_RequestDenied"));
    }
}
