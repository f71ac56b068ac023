use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of failure buckets an intercepted task error is sorted into.
///
/// The kind drives the retry and fallback decisions; it never carries the
/// original error text (see [`TaskErrorInfo`](super::TaskErrorInfo) for that).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Permission,
    ResourceNotFound,
    Validation,
    RateLimit,
    Filesystem,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::Authentication,
        ErrorKind::Permission,
        ErrorKind::ResourceNotFound,
        ErrorKind::Validation,
        ErrorKind::RateLimit,
        ErrorKind::Filesystem,
        ErrorKind::Unknown,
    ];

    /// Credential and authorisation failures are never retried automatically:
    /// repeating them burns attempts and can lock accounts.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Authentication | ErrorKind::Permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
