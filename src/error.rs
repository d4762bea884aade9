//! Request-time error taxonomy.
//!
//! Every failure a handler can report maps to one [`ErrorCode`]. The code
//! decides the HTTP status and the wire string placed in the envelope's
//! `error` field.

use axum::http::StatusCode;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors surfaced to callers through the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    /// Percentage was not an integer in `0..=100`.
    #[error("expected percentage value between 0 and 100")]
    InvalidPercentage,

    /// Duration was unparseable or negative.
    #[error("expected a zero or positive duration")]
    InvalidDuration,

    /// Failure-handling flag was not a boolean.
    #[error("expected boolean value for handling failures")]
    InvalidBoolean,

    /// Concurrency mode was not serial, mixed or parallel.
    #[error("invalid or no concurrency type set")]
    InvalidConcurrencyMode,

    /// `/proxy/` was not followed by a usable host.
    #[error("invalid or no proxy service set")]
    InvalidProxyTarget,

    /// Injected failure.
    #[error("internal service failure occurred")]
    InternalFailure,

    /// The next hop could not be reached at all.
    #[error("downstream service could not be reached")]
    UpstreamFailure,
}

impl ErrorCode {
    /// HTTP status reported alongside this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::UpstreamFailure => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable identifier used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPercentage => "invalid_percentage",
            ErrorCode::InvalidDuration => "invalid_duration",
            ErrorCode::InvalidBoolean => "invalid_boolean",
            ErrorCode::InvalidConcurrencyMode => "invalid_concurrency_mode",
            ErrorCode::InvalidProxyTarget => "invalid_proxy_target",
            ErrorCode::InternalFailure => "internal_failure",
            ErrorCode::UpstreamFailure => "upstream_failure",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
