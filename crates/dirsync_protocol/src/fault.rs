//! Service fault bodies and their retry classification.

use serde::Deserialize;
use std::fmt;

/// Fault code reported when the bearer credential has expired.
pub const EXPIRED_TOKEN_CODE: &str = "Authentication_ExpiredToken";

/// Category of a non-retryable service rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// Caller identity is unknown, disabled or lacks privileges.
    Permission,
    /// The request itself is malformed.
    MalformedRequest,
    /// Data contract version missing or unsupported.
    VersionMismatch,
    /// The caller is throttled.
    Throttled,
    /// The query is invalid or unsupported.
    UnsupportedQuery,
    /// Generic service failure.
    Internal,
    /// Unrecognised fault code.
    Unknown,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectionKind::Permission => "permission",
            RejectionKind::MalformedRequest => "malformed request",
            RejectionKind::VersionMismatch => "version mismatch",
            RejectionKind::Throttled => "throttled",
            RejectionKind::UnsupportedQuery => "unsupported query",
            RejectionKind::Internal => "internal error",
            RejectionKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How the client reacts to a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Re-acquire the credential and retry the same call.
    AuthExpired,
    /// Give up on this cycle.
    Rejected(RejectionKind),
}

impl FaultClass {
    /// Classifies a service fault code.
    pub fn from_code(code: &str) -> Self {
        let kind = match code {
            EXPIRED_TOKEN_CODE => return FaultClass::AuthExpired,
            "Authentication_Unauthorized"
            | "Authentication_UnsupportedTokenType"
            | "Authorization_IdentityNotFound"
            | "Authorization_IdentityDisabled"
            | "Authorization_RequestDenied" => RejectionKind::Permission,
            "Request_BadRequest"
            | "Request_InvalidRequestUrl"
            | "Request_InvalidReplicaSessionKey"
            | "Headers_HeaderNotSupported"
            | "Request_MediaTypeNotSupported" => RejectionKind::MalformedRequest,
            "Headers_DataContractVersionMissing" | "Headers_InvalidDataContractVersion" => {
                RejectionKind::VersionMismatch
            }
            "Request_ThrottledTemporarily" | "Request_ThrottledPermanently" => {
                RejectionKind::Throttled
            }
            "Request_UnsupportedQuery" => RejectionKind::UnsupportedQuery,
            "Service_InternalServerError" => RejectionKind::Internal,
            _ => RejectionKind::Unknown,
        };
        FaultClass::Rejected(kind)
    }
}

/// A fault reported by the service in an error response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    /// Fault code, e.g. `Request_BadRequest`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

#[derive(Deserialize)]
struct FaultEnvelope {
    #[serde(rename = "odata.error")]
    error: FaultBody,
}

#[derive(Deserialize)]
struct FaultBody {
    code: String,
    #[serde(default)]
    message: Option<FaultMessage>,
}

#[derive(Deserialize)]
struct FaultMessage {
    #[serde(default)]
    value: String,
}

impl ServiceFault {
    /// Parses a fault from an error response body.
    ///
    /// Returns `None` when the body is not a recognisable fault document.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let envelope: FaultEnvelope = serde_json::from_slice(body).ok()?;
        Some(Self {
            code: envelope.error.code,
            message: envelope
                .error
                .message
                .map(|message| message.value)
                .unwrap_or_default(),
        })
    }

    /// Classifies this fault.
    pub fn class(&self) -> FaultClass {
        FaultClass::from_code(&self.code)
    }
}
