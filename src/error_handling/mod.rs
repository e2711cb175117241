//! Error handling.
//!
//! This module provides:
//! - Error type definitions (fatal audit errors, fetch errors, initialization errors)
//! - Categorization of `reqwest` transport errors
//!
//! Errors are split into:
//! - **Fatal**: `AuditError`, the only kind propagated to the caller
//! - **Recoverable**: `FetchError` and parse failures, which analyzers turn into
//!   `errors[]` entries on their own result

mod categorization;
mod types;

// Re-export public API
pub use categorization::{categorize_reqwest_error, fetch_error_from_reqwest};
pub use types::{AuditError, FetchError, FetchErrorKind, InitializationError};
