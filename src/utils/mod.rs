//! Shared helpers.
//!
//! - Error message sanitization
//! - CSS selector parsing with a non-panicking fallback
//! - Score clamping and host comparison helpers used by several analyzers

pub mod sanitize;
mod selector;

pub use selector::parse_selector_with_fallback;

/// Rounds and clamps a raw score into `0..=100`.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Strips a leading `www.` and lower-cases a host for comparisons.
pub fn bare_host(host: &str) -> String {
    let lower = host.to_ascii_lowercase();
    lower
        .strip_prefix("www.")
        .map(str::to_string)
        .unwrap_or(lower)
}

/// True when `haystack` contains any of `needles` (case-insensitive).
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}
