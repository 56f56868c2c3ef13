//! Failure classification for remote calls.
//!
//! The remote tool reports failures as unstructured text, so classification
//! matches on the message. Rules are priority-ordered and the first match wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RETRY_AFTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry[-_ ]after\D{0,3}(\d+)").unwrap());

static SERVER_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b50[234]\b").unwrap());

static AUTH_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b40[13]\b").unwrap());

static NOT_FOUND_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b404\b").unwrap());

static VALIDATION_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b422\b").unwrap());

const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "too many requests"];

const SERVER_PHRASES: &[&str] = &["bad gateway", "service unavailable"];

const NETWORK_TOKENS: &[&str] = &[
    "etimedout",
    "econnreset",
    "econnrefused",
    "enotfound",
    "socket hang up",
    "timeout",
    "timed out",
];

/// Category of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    ServerError,
    NetworkError,
    AuthError,
    NotFound,
    Validation,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transient kinds are worth retrying; the rest are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::ServerError | ErrorKind::NetworkError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single failure. Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ClassifiedError {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            recoverable: kind.is_transient(),
            retry_after_ms: None,
        }
    }
}

/// Classify any displayable failure by its message text.
pub fn classify<E: fmt::Display + ?Sized>(error: &E) -> ClassifiedError {
    classify_message(&error.to_string())
}

/// Shorthand for `classify(error).recoverable`.
pub fn is_recoverable<E: fmt::Display + ?Sized>(error: &E) -> bool {
    classify(error).recoverable
}

/// Classify a raw failure message. Total: every input yields one verdict.
pub fn classify_message(message: &str) -> ClassifiedError {
    let lower = message.to_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    if contains_any(RATE_LIMIT_PHRASES) {
        let mut verdict = ClassifiedError::of(ErrorKind::RateLimit);
        verdict.retry_after_ms = retry_after_ms(message);
        return verdict;
    }

    if SERVER_STATUS_RE.is_match(&lower) || contains_any(SERVER_PHRASES) {
        return ClassifiedError::of(ErrorKind::ServerError);
    }

    if contains_any(NETWORK_TOKENS) {
        return ClassifiedError::of(ErrorKind::NetworkError);
    }

    if AUTH_STATUS_RE.is_match(&lower) || lower.contains("bad credentials") {
        return ClassifiedError::of(ErrorKind::AuthError);
    }

    if NOT_FOUND_STATUS_RE.is_match(&lower) || lower.contains("not found") {
        return ClassifiedError::of(ErrorKind::NotFound);
    }

    if VALIDATION_STATUS_RE.is_match(&lower) || lower.contains("validation failed") {
        return ClassifiedError::of(ErrorKind::Validation);
    }

    ClassifiedError::of(ErrorKind::Unknown)
}

/// Extract a `retry-after` hint in seconds and convert it to milliseconds.
fn retry_after_ms(message: &str) -> Option<u64> {
    RETRY_AFTER_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}
