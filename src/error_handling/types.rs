//! Error type definitions.
//!
//! This module defines the error types used throughout the audit pipeline.
//! Only `AuditError` is ever returned to the caller of an audit; every other
//! failure is recovered inside the analyzer that hit it.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::{EnumIter as EnumIterMacro, IntoStaticStr};
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Fatal errors that abort an audit before (or instead of) any analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The top-level URL failed validation.
    #[error("Invalid audit target URL: {0}")]
    InvalidUrl(String),

    /// The audit was cancelled by the caller.
    #[error("Audit cancelled")]
    Cancelled,
}

/// Category of a failed outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro, IntoStaticStr)]
pub enum FetchErrorKind {
    #[strum(serialize = "timeout")]
    Timeout,
    #[strum(serialize = "connect")]
    Connect,
    #[strum(serialize = "redirect")]
    Redirect,
    #[strum(serialize = "body")]
    Body,
    #[strum(serialize = "body_too_large")]
    BodyTooLarge,
    #[strum(serialize = "decode")]
    Decode,
    #[strum(serialize = "invalid_url")]
    InvalidUrl,
    #[strum(serialize = "blocked")]
    Blocked,
    #[strum(serialize = "other")]
    Other,
}

impl FetchErrorKind {
    /// Short code for the error kind
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Error returned by a `Fetcher` for a single outbound request.
///
/// Non-2xx statuses are not errors: they are returned as responses so callers
/// can record the status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} error fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    /// The request was refused by the SSRF guard before any I/O happened.
    pub fn blocked(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Blocked, url, reason)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FetchErrorKind::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_fetch_error_kind_codes_unique() {
        let mut codes: Vec<&str> = FetchErrorKind::iter().map(|k| k.as_str()).collect();
        let len = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), len);
    }

    #[test]
    fn test_fetch_error_display_includes_url() {
        let err = FetchError::new(FetchErrorKind::Timeout, "https://example.com", "took too long");
        let msg = err.to_string();
        assert!(msg.contains("https://example.com"));
        assert!(msg.contains("took too long"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_audit_error_display() {
        let err = AuditError::InvalidUrl("http://127.0.0.1".into());
        assert!(err.to_string().contains("127.0.0.1"));
        assert_eq!(AuditError::Cancelled.to_string(), "Audit cancelled");
    }
}
