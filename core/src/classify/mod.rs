//! # Error classification
//!
//! [`ErrorClassifier`] maps a failed attempt's [`TaskError`] onto a closed
//! [`ErrorKind`]. Patterns are checked in registration order and the first
//! match wins; anything unmatched is [`ErrorKind::Unknown`].
//!
//! The built-in table is registered at construction. Callers add their own
//! error families with [`ErrorClassifier::register`] without touching the
//! built-ins; a pattern may carry a [`Remediation`] that gets a chance to
//! resolve the failure before the retry policy is consulted.

mod patterns;
mod remediation;

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{ErrorKind, TaskError};

pub use remediation::{Remediation, RemediationContext};

/// Key reported for errors no pattern claimed.
pub const UNKNOWN_PATTERN: &str = "unknown";

type MatchFn = Arc<dyn Fn(&TaskError) -> bool + Send + Sync>;

#[derive(Clone)]
enum Matcher {
    Keywords {
        words: Vec<String>,
        names: Vec<String>,
    },
    Regex {
        message: Regex,
        names: Vec<String>,
    },
    Custom(MatchFn),
}

impl Matcher {
    fn matches(&self, error: &TaskError, normalized: &str) -> bool {
        match self {
            Matcher::Keywords { words, names } => {
                words.iter().any(|w| contains_keyword(normalized, w)) || name_matches(names, error)
            }
            Matcher::Regex { message, names } => {
                message.is_match(normalized) || name_matches(names, error)
            }
            Matcher::Custom(f) => f(error),
        }
    }
}

fn name_matches(names: &[String], error: &TaskError) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(&error.name))
}

/// Substring match; purely numeric keywords (status codes) must stand alone.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if !keyword.chars().all(|c| c.is_ascii_digit()) {
        return haystack.contains(keyword);
    }

    let bytes = haystack.as_bytes();
    haystack.match_indices(keyword).any(|(start, _)| {
        let end = start + keyword.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        before_ok && after_ok
    })
}

/// One `(key, matcher, remediation)` entry of the classifier table.
#[derive(Clone)]
pub struct ErrorPattern {
    key: String,
    kind: ErrorKind,
    matcher: Matcher,
    remediation: Option<Arc<dyn Remediation>>,
}

impl ErrorPattern {
    /// Pattern driven by an arbitrary predicate.
    pub fn new<F>(key: impl Into<String>, kind: ErrorKind, matcher: F) -> Self
    where
        F: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            kind,
            matcher: Matcher::Custom(Arc::new(matcher)),
            remediation: None,
        }
    }

    /// Pattern matching any of `keywords` inside the lower-cased message.
    ///
    /// Purely numeric keywords (status codes) only match as whole words.
    pub fn keywords(key: impl Into<String>, kind: ErrorKind, keywords: &[&str]) -> Self {
        Self {
            key: key.into(),
            kind,
            matcher: Matcher::Keywords {
                words: keywords.iter().map(|kw| kw.to_lowercase()).collect(),
                names: Vec::new(),
            },
            remediation: None,
        }
    }

    /// Pattern matching a caller-supplied regular expression against the
    /// lower-cased message.
    pub fn regex(
        key: impl Into<String>,
        kind: ErrorKind,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            key: key.into(),
            kind,
            matcher: Matcher::Regex {
                message: Regex::new(pattern)?,
                names: Vec::new(),
            },
            remediation: None,
        })
    }

    /// Also match errors whose `name` equals one of `names` (case-insensitive).
    pub fn with_error_names(mut self, extra: &[&str]) -> Self {
        match &mut self.matcher {
            Matcher::Keywords { names, .. } | Matcher::Regex { names, .. } => {
                names.extend(extra.iter().map(|n| n.to_string()));
            }
            Matcher::Custom(f) => {
                let inner = f.clone();
                let extra: Vec<String> = extra.iter().map(|n| n.to_string()).collect();
                self.matcher = Matcher::Custom(Arc::new(move |e: &TaskError| {
                    inner(e) || extra.iter().any(|n| n.eq_ignore_ascii_case(&e.name))
                }));
            }
        }
        self
    }

    pub fn with_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPattern")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("remediation", &self.remediation.is_some())
            .finish()
    }
}

/// Outcome of classifying one error.
#[derive(Clone)]
pub struct Classification {
    pub kind: ErrorKind,
    /// Key of the pattern that matched, or [`UNKNOWN_PATTERN`].
    pub pattern: String,
    pub remediation: Option<Arc<dyn Remediation>>,
}

impl fmt::Debug for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classification")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern)
            .field("remediation", &self.remediation.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl ErrorClassifier {
    /// Classifier preloaded with the built-in patterns.
    pub fn new() -> Self {
        Self {
            patterns: patterns::builtin(),
        }
    }

    /// Classifier with no patterns at all; everything is `Unknown` until
    /// patterns are registered.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Append a pattern. It is consulted after every pattern registered before it.
    pub fn register(&mut self, pattern: ErrorPattern) {
        tracing::debug!(key = %pattern.key, kind = %pattern.kind, "error pattern registered");
        self.patterns.push(pattern);
    }

    pub fn classify(&self, error: &TaskError) -> ErrorKind {
        self.classify_detailed(error).kind
    }

    pub fn classify_detailed(&self, error: &TaskError) -> Classification {
        let normalized = normalize(&error.message);

        self.patterns
            .iter()
            .find(|p| p.matcher.matches(error, &normalized))
            .map(|p| Classification {
                kind: p.kind,
                pattern: p.key.clone(),
                remediation: p.remediation.clone(),
            })
            .unwrap_or_else(|| Classification {
                kind: ErrorKind::Unknown,
                pattern: UNKNOWN_PATTERN.to_string(),
                remediation: None,
            })
    }

    pub fn pattern_keys(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.key.as_str()).collect()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(message: &str) -> String {
    message.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(message: &str) -> ErrorKind {
        ErrorClassifier::new().classify(&TaskError::new(message))
    }

    #[test]
    fn test_builtin_keywords() {
        assert_eq!(kind_of("Request timed out"), ErrorKind::Timeout);
        assert_eq!(kind_of("connect ETIMEDOUT 10.0.0.1:443"), ErrorKind::Timeout);
        assert_eq!(kind_of("401 Unauthorized"), ErrorKind::Authentication);
        assert_eq!(kind_of("user is unauthenticated"), ErrorKind::Authentication);
        assert_eq!(kind_of("Forbidden: missing scope"), ErrorKind::Permission);
        assert_eq!(kind_of("permission denied (os error 13)"), ErrorKind::Permission);
        assert_eq!(kind_of("HTTP 429"), ErrorKind::RateLimit);
        assert_eq!(kind_of("Too Many Requests"), ErrorKind::RateLimit);
        assert_eq!(kind_of("ENOENT: no such file or directory"), ErrorKind::Filesystem);
        assert_eq!(kind_of("page not found"), ErrorKind::ResourceNotFound);
        assert_eq!(kind_of("ECONNRESET by peer"), ErrorKind::Network);
        assert_eq!(kind_of("invalid payload"), ErrorKind::Validation);
        assert_eq!(kind_of("something odd happened"), ErrorKind::Unknown);
    }

    #[test]
    fn test_status_codes_match_whole_words_only() {
        assert_eq!(kind_of("order 14290 rejected"), ErrorKind::Unknown);
        assert_eq!(kind_of("status=429"), ErrorKind::RateLimit);
    }

    #[test]
    fn test_error_name_matches_without_keyword() {
        let err = TaskError::named("TimeoutError", "gave up");
        assert_eq!(ErrorClassifier::new().classify(&err), ErrorKind::Timeout);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = ErrorClassifier::new();
        let err = TaskError::new("socket hang up");
        let first = classifier.classify(&err);
        for _ in 0..10 {
            assert_eq!(classifier.classify(&err), first);
        }
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let mut classifier = ErrorClassifier::empty();
        classifier.register(ErrorPattern::keywords(
            "quota",
            ErrorKind::RateLimit,
            &["quota"],
        ));
        classifier.register(ErrorPattern::keywords(
            "disk-quota",
            ErrorKind::Filesystem,
            &["disk quota"],
        ));

        let c = classifier.classify_detailed(&TaskError::new("Disk quota exceeded"));
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert_eq!(c.pattern, "quota");
    }

    #[test]
    fn test_custom_predicate_pattern() {
        let mut classifier = ErrorClassifier::empty();
        classifier.register(ErrorPattern::new("vendor", ErrorKind::Network, |e| {
            e.name == "VendorError"
        }));

        assert_eq!(
            classifier.classify(&TaskError::named("VendorError", "boom")),
            ErrorKind::Network
        );
        let c = classifier.classify_detailed(&TaskError::new("boom"));
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert_eq!(c.pattern, UNKNOWN_PATTERN);
    }

    #[test]
    fn test_regex_pattern() {
        let mut classifier = ErrorClassifier::empty();
        classifier.register(
            ErrorPattern::regex("db-lock", ErrorKind::Network, r"database is locked|sqlite_busy")
                .unwrap(),
        );
        assert_eq!(
            classifier.classify(&TaskError::new("SQLITE_BUSY: retry")),
            ErrorKind::Network
        );
    }
}
