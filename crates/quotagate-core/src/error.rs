//! Shared error type across quotaGate crates.

use thiserror::Error;

/// Client-facing rejection codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectCode {
    /// Malformed configuration or protocol misuse.
    BadRequest,
    /// Precondition failed (content-type, payload shape, authorization).
    Forbidden,
    /// Body exceeded the configured limit.
    PayloadTooLarge,
    /// Policy service denied the request.
    QuotaExceeded,
    /// Internal failure while processing a single request.
    Internal,
    /// Forwarding to the upstream failed.
    BadGateway,
    /// Policy service could not produce a verdict.
    Unavailable,
}

impl RejectCode {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectCode::BadRequest => "BAD_REQUEST",
            RejectCode::Forbidden => "FORBIDDEN",
            RejectCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            RejectCode::QuotaExceeded => "QUOTA_EXCEEDED",
            RejectCode::Internal => "INTERNAL",
            RejectCode::BadGateway => "BAD_GATEWAY",
            RejectCode::Unavailable => "UNAVAILABLE",
        }
    }

    /// HTTP status sent to the client for this code.
    pub fn status(self) -> u16 {
        match self {
            RejectCode::BadRequest => 400,
            RejectCode::Forbidden => 403,
            RejectCode::PayloadTooLarge => 413,
            RejectCode::QuotaExceeded => 429,
            RejectCode::Internal => 500,
            RejectCode::BadGateway => 502,
            RejectCode::Unavailable => 503,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, QuotaGateError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum QuotaGateError {
    #[error("invalid config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("body event after end of stream")]
    BodyAfterEnd,
    #[error("host call failed: {0}")]
    Host(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl QuotaGateError {
    /// Map internal error to a stable client-facing code.
    pub fn reject_code(&self) -> RejectCode {
        match self {
            QuotaGateError::BadConfig(_) => RejectCode::BadRequest,
            QuotaGateError::UnsupportedVersion => RejectCode::BadRequest,
            QuotaGateError::PayloadTooLarge => RejectCode::PayloadTooLarge,
            QuotaGateError::BodyAfterEnd => RejectCode::BadRequest,
            QuotaGateError::Host(_) => RejectCode::Internal,
            QuotaGateError::Dispatch(_) => RejectCode::Forbidden,
            QuotaGateError::Upstream(_) => RejectCode::BadGateway,
            QuotaGateError::Internal(_) => RejectCode::Internal,
        }
    }
}
