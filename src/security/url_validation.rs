//! URL validation and SSRF protection.
//!
//! This module provides functions to validate URLs and prevent SSRF (Server-Side Request Forgery)
//! attacks by blocking access to:
//! - Private/internal IP addresses (RFC 1918, RFC 4193, etc.)
//! - Localhost addresses and internal-only TLDs
//! - Non-HTTP/HTTPS schemes (file://, ftp://, etc.)
//! - Path traversal patterns
//!
//! Every URL discovered during an audit (redirect targets, sitemap children,
//! canonical targets) is attacker-controlled and must pass this check before
//! it is dereferenced.

use anyhow::{Context, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::Url;

/// TLDs that only resolve inside private networks.
const BLOCKED_TLDS: &[&str] = &[
    "local",
    "localdomain",
    "internal",
    "intranet",
    "lan",
    "corp",
    "home",
    "invalid",
];

/// Validates that a URL is safe to fetch (SSRF protection).
///
/// This function checks:
/// - URL uses http:// or https:// scheme
/// - Host is not a private/internal IP address
/// - Host is not localhost or under an internal-only TLD
/// - URL does not contain path traversal sequences
///
/// # Examples
///
/// ```
/// use seo_audit::security::validate_url_safe;
///
/// assert!(validate_url_safe("https://example.com").is_ok());
/// assert!(validate_url_safe("http://127.0.0.1").is_err());
/// assert!(validate_url_safe("file:///etc/passwd").is_err());
/// ```
pub fn validate_url_safe(url_str: &str) -> Result<()> {
    check_scheme_and_traversal(url_str)?;
    let url = Url::parse(url_str).with_context(|| format!("Failed to parse URL: {}", url_str))?;

    match url.host() {
        Some(url::Host::Domain(domain)) => {
            if is_localhost_domain(domain) {
                return Err(anyhow::anyhow!(
                    "Unsafe URL: localhost domain '{}' is not allowed: {}",
                    domain,
                    url_str
                ));
            }
            if has_blocked_tld(domain) {
                return Err(anyhow::anyhow!(
                    "Unsafe URL: internal TLD in '{}' is not allowed: {}",
                    domain,
                    url_str
                ));
            }
        }
        Some(url::Host::Ipv4(ip)) => {
            if is_private_ipv4(ip) {
                return Err(anyhow::anyhow!(
                    "Unsafe URL: private IPv4 address '{}' is not allowed: {}",
                    ip,
                    url_str
                ));
            }
        }
        Some(url::Host::Ipv6(ip)) => {
            if is_private_ipv6(ip) {
                return Err(anyhow::anyhow!(
                    "Unsafe URL: private IPv6 address '{}' is not allowed: {}",
                    ip,
                    url_str
                ));
            }
        }
        None => return Err(anyhow::anyhow!("URL has no host component: {}", url_str)),
    }

    Ok(())
}

/// Scheme and traversal checks shared by the strict and permissive policies.
fn check_scheme_and_traversal(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str).with_context(|| format!("Failed to parse URL: {}", url_str))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(anyhow::anyhow!(
                "Unsafe URL scheme '{}' (only http:// and https:// allowed): {}",
                scheme,
                url_str
            ));
        }
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(anyhow::anyhow!("URL has no host component: {}", url_str));
    }

    // Url::parse normalizes dot segments away, so inspect the raw string
    if has_path_traversal(url_str) {
        return Err(anyhow::anyhow!(
            "Unsafe URL: path traversal pattern is not allowed: {}",
            url_str
        ));
    }

    Ok(())
}

fn has_path_traversal(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    lower.contains("/../")
        || lower.ends_with("/..")
        || lower.contains("..\\")
        || lower.contains("%2e%2e")
        || lower.contains("..%2f")
        || lower.contains("..%5c")
}

/// Checks if an IPv4 address is private/internal.
///
/// Blocked ranges: loopback, RFC 1918, link-local, this-network,
/// carrier-grade NAT (100.64.0.0/10), multicast and reserved.
fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || octets[0] == 0
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        || ip.is_multicast()
        || octets[0] >= 240
}

/// Checks if an IPv6 address is private/internal (RFC 4193, RFC 4291).
fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    // fc00::/7 (unique local addresses)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 (link-local)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // ff00::/8 (multicast)
    if segments[0] & 0xff00 == 0xff00 {
        return true;
    }
    // ::ffff:0:0/96 (IPv4-mapped) inherits the IPv4 verdict
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(v4);
    }

    false
}

/// Checks if a domain name is a localhost variant.
fn is_localhost_domain(domain: &str) -> bool {
    let domain_lower = domain.to_lowercase();
    let trimmed = domain_lower.trim_end_matches('.');
    trimmed == "localhost"
        || trimmed == "localhost.localdomain"
        || trimmed.ends_with(".localhost")
}

fn has_blocked_tld(domain: &str) -> bool {
    let lower = domain.to_lowercase();
    let trimmed = lower.trim_end_matches('.');
    match trimmed.rsplit_once('.') {
        Some((_, tld)) => BLOCKED_TLDS.contains(&tld),
        // Single-label hosts ("intranet", "router") only resolve internally
        None => true,
    }
}

/// The URL check applied to every URL an analyzer is about to dereference.
///
/// `strict()` enforces the full SSRF rule set. `permissive()` keeps the scheme
/// and traversal checks but allows private hosts; it exists for audits of
/// local staging servers and for tests against loopback mock servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlPolicy {
    allow_private_hosts: bool,
}

impl UrlPolicy {
    pub fn strict() -> Self {
        Self {
            allow_private_hosts: false,
        }
    }

    pub fn permissive() -> Self {
        Self {
            allow_private_hosts: true,
        }
    }

    /// Returns `Err(reason)` when `url` must not be fetched.
    pub fn check(&self, url: &str) -> std::result::Result<(), String> {
        let result = if self.allow_private_hosts {
            check_scheme_and_traversal(url)
        } else {
            validate_url_safe(url)
        };
        result.map_err(|e| e.to_string())
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.check(url).is_ok()
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::strict()
    }
}
