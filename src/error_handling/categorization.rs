//! Error categorization.
//!
//! Maps transport-level `reqwest` failures onto the crate's `FetchError`
//! taxonomy so analyzers can report them uniformly.

use super::types::{FetchError, FetchErrorKind};

/// Categorizes a `reqwest::Error` into a `FetchErrorKind`.
///
/// # Arguments
///
/// * `error` - The `reqwest::Error` to categorize
///
/// # Returns
///
/// The appropriate `FetchErrorKind` for the error.
pub fn categorize_reqwest_error(error: &reqwest::Error) -> FetchErrorKind {
    if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_connect() {
        FetchErrorKind::Connect
    } else if error.is_redirect() {
        FetchErrorKind::Redirect
    } else if error.is_body() {
        FetchErrorKind::Body
    } else if error.is_decode() {
        FetchErrorKind::Decode
    } else if error.is_builder() {
        FetchErrorKind::InvalidUrl
    } else {
        FetchErrorKind::Other
    }
}

/// Converts a `reqwest::Error` raised while fetching `url` into a `FetchError`.
pub fn fetch_error_from_reqwest(url: &str, error: &reqwest::Error) -> FetchError {
    let kind = categorize_reqwest_error(error);
    let message = crate::utils::sanitize::sanitize_and_truncate_error_message(&error.to_string());
    FetchError::new(kind, url, message)
}
