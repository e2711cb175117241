//! HTTP header name constants.
//!
//! This module defines constants for the security headers inspected by the
//! transport-security analyzer, along with the point value each one carries
//! in the header sub-score.

// Security header names
/// HTTP Strict Transport Security header
pub const HEADER_STRICT_TRANSPORT_SECURITY: &str = "Strict-Transport-Security";
/// Content Security Policy header
pub const HEADER_CONTENT_SECURITY_POLICY: &str = "Content-Security-Policy";
/// X-Frame-Options header
pub const HEADER_X_FRAME_OPTIONS: &str = "X-Frame-Options";
/// X-Content-Type-Options header
pub const HEADER_X_CONTENT_TYPE_OPTIONS: &str = "X-Content-Type-Options";
/// X-XSS-Protection header
pub const HEADER_X_XSS_PROTECTION: &str = "X-XSS-Protection";
/// Referrer-Policy header
pub const HEADER_REFERRER_POLICY: &str = "Referrer-Policy";
/// Permissions-Policy header
pub const HEADER_PERMISSIONS_POLICY: &str = "Permissions-Policy";

/// Security headers inspected, with their weight in the header sub-score.
/// The weights sum to 100. To add/remove headers, modify this array.
pub const SECURITY_HEADERS: &[(&str, u32)] = &[
    (HEADER_STRICT_TRANSPORT_SECURITY, 25),
    (HEADER_CONTENT_SECURITY_POLICY, 20),
    (HEADER_X_FRAME_OPTIONS, 15),
    (HEADER_X_CONTENT_TYPE_OPTIONS, 15),
    (HEADER_X_XSS_PROTECTION, 10),
    (HEADER_REFERRER_POLICY, 10),
    (HEADER_PERMISSIONS_POLICY, 5),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_header_weights_sum_to_100() {
        let total: u32 = SECURITY_HEADERS.iter().map(|(_, w)| w).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_security_header_names_unique() {
        let mut names: Vec<_> = SECURITY_HEADERS
            .iter()
            .map(|(n, _)| n.to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SECURITY_HEADERS.len());
    }
}
