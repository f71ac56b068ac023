use crate::error::ErrorKind;

use super::ErrorPattern;

/// Built-in pattern table, in evaluation order.
///
/// Order matters where keywords overlap: "timed out" wins over the generic
/// network words, "file not found" over "not found", and credential words
/// over "invalid".
pub(super) fn builtin() -> Vec<ErrorPattern> {
    vec![
        ErrorPattern::keywords(
            "rate-limit",
            ErrorKind::RateLimit,
            &["429", "rate limit", "rate-limit", "too many requests", "quota exceeded"],
        ),
        ErrorPattern::keywords(
            "timeout",
            ErrorKind::Timeout,
            &["timeout", "timed out", "etimedout", "deadline exceeded"],
        )
        .with_error_names(&["TimeoutError"]),
        ErrorPattern::keywords(
            "auth",
            ErrorKind::Authentication,
            &[
                "unauthorized",
                "unauthenticated",
                "authentication",
                "401",
                "invalid token",
                "token expired",
                "invalid credentials",
            ],
        )
        .with_error_names(&["AuthError"]),
        ErrorPattern::keywords(
            "permission",
            ErrorKind::Permission,
            &["forbidden", "permission", "403", "access denied", "eacces", "eperm"],
        ),
        ErrorPattern::keywords(
            "filesystem",
            ErrorKind::Filesystem,
            &[
                "enoent",
                "no such file",
                "file not found",
                "directory not found",
                "eisdir",
                "enotdir",
                "enospc",
            ],
        )
        .with_error_names(&["FileSystemError"]),
        ErrorPattern::keywords(
            "not-found",
            ErrorKind::ResourceNotFound,
            &["not found", "404", "does not exist"],
        ),
        ErrorPattern::keywords(
            "network",
            ErrorKind::Network,
            &[
                "network",
                "econnrefused",
                "econnreset",
                "enotfound",
                "connection",
                "socket hang up",
                "dns",
                "502",
                "503",
            ],
        )
        .with_error_names(&["NetworkError"]),
        ErrorPattern::keywords(
            "validation",
            ErrorKind::Validation,
            &["invalid", "validation", "malformed", "bad request", "400"],
        )
        .with_error_names(&["ValidationError"]),
    ]
}
