//! Configuration constants.
//!
//! This module defines all configuration constants used throughout the audit
//! pipeline, including timeouts, size limits, scoring thresholds and the
//! indicator lists used for substring classification.

use std::time::Duration;

// Network operation timeouts
/// Default per-request HTTP timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
/// TCP connection timeout in seconds (certificate inspection)
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 5;
/// TLS handshake timeout in seconds (certificate inspection)
pub const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Timeout for one PageSpeed API run in seconds
/// Lighthouse runs are slow; a mobile run regularly takes 15-25s
pub const PAGESPEED_TIMEOUT_SECS: u64 = 30;
/// Upper bound for a single analyzer, including all of its sub-requests
pub const ANALYZER_TIMEOUT: Duration = Duration::from_secs(120);
/// Maximum concurrent outbound HTTP requests per fetcher
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default User-Agent string for HTTP requests.
///
/// Users can override this via the `--user-agent` CLI flag.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; seo_audit/0.1; +https://github.com/alexwoolford/seo_audit)";

// Response and body size limits
/// Maximum response body size in bytes (10MB)
/// Bodies are truncated at this size to prevent memory exhaustion
pub const MAX_RESPONSE_BODY_SIZE: usize = 10 * 1024 * 1024;
/// Maximum decompressed sitemap size in bytes (50MB, the sitemaps.org limit)
/// Guards against gzip bombs: decompression stops once this is exceeded
pub const MAX_DECOMPRESSED_SITEMAP_SIZE: usize = 50 * 1024 * 1024;
/// Maximum error message length in characters (2000 chars)
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2000;
/// Maximum URL length accepted for analysis
pub const MAX_URL_LENGTH: usize = 2048;
/// Maximum amount of page text hashed for duplicate-content fingerprints
pub const MAX_HTML_TEXT_EXTRACTION_CHARS: usize = 200_000;

// Redirect handling
/// Maximum number of redirect hops to follow
/// Prevents infinite redirect loops and excessive request chains
pub const MAX_REDIRECT_HOPS: usize = 10;

// Robots / sitemap analysis
/// Conventional sitemap locations probed when robots.txt names none
pub const CONVENTIONAL_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemaps.xml",
    "/sitemap1.xml",
];
/// Default cap on URL entries kept per `<urlset>`
pub const DEFAULT_MAX_SITEMAP_URLS: usize = 1000;
/// Default number of sitemap URLs probed for accessibility
pub const DEFAULT_MAX_ACCESSIBILITY_TESTS: usize = 50;
/// Maximum failing URLs retained for diagnostics
pub const MAX_FAILED_URL_SAMPLES: usize = 10;
/// Concurrent accessibility probes per audit
pub const ACCESSIBILITY_CONCURRENCY: usize = 5;
/// Total sitemap documents fetched per audit (bounds index recursion)
pub const MAX_SITEMAPS_PER_AUDIT: usize = 50;
/// A sitemap URL counts as fresh if its lastmod falls within this window
pub const SITEMAP_FRESHNESS_DAYS: i64 = 30;
/// Valid `<changefreq>` tokens
pub const CHANGEFREQ_VALUES: &[&str] = &[
    "always", "hourly", "daily", "weekly", "monthly", "yearly", "never",
    // Not in the sitemaps.org schema but accepted by the major engines
    "biweekly", "quarterly",
];

// Transport security
/// Certificates expiring within this many days are flagged
pub const CERT_EXPIRY_WARNING_DAYS: i64 = 30;
/// RSA keys shorter than this are considered weak
pub const MIN_RSA_KEY_BITS: u32 = 2048;
/// HSTS max-age below this (one year) earns only partial credit
pub const HSTS_RECOMMENDED_MAX_AGE: u64 = 31_536_000;
/// Referrer-Policy values considered restrictive
pub const RESTRICTIVE_REFERRER_POLICIES: &[&str] = &[
    "no-referrer",
    "same-origin",
    "strict-origin",
    "strict-origin-when-cross-origin",
];
/// Substrings identifying CDN hosts
pub const CDN_INDICATORS: &[&str] = &[
    "cdn",
    "cloudflare",
    "cloudfront",
    "akamai",
    "fastly",
    "jsdelivr",
    "unpkg",
    "googleapis",
    "gstatic",
    "bootstrapcdn",
    "azureedge",
    "edgekey",
];
/// Substrings identifying tracking / advertising hosts
pub const HIGH_RISK_INDICATORS: &[&str] = &[
    "doubleclick",
    "google-analytics",
    "googletagmanager",
    "googlesyndication",
    "facebook.net",
    "hotjar",
    "mixpanel",
    "segment.",
    "adservice",
    "adsystem",
    "tracking",
    "tracker",
    "analytics",
];
/// Substrings identifying social-media hosts
pub const SOCIAL_MEDIA_INDICATORS: &[&str] = &[
    "facebook",
    "twitter",
    "x.com",
    "linkedin",
    "instagram",
    "pinterest",
    "youtube",
    "tiktok",
];

// Performance signals
/// Default PageSpeed Insights endpoint
pub const DEFAULT_PAGESPEED_ENDPOINT: &str =
    "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
/// Lighthouse audits scoring below this are reported as opportunities
pub const OPPORTUNITY_SCORE_THRESHOLD: f64 = 0.9;
/// LCP good / poor boundaries in milliseconds
pub const LCP_THRESHOLDS_MS: (f64, f64) = (2500.0, 4000.0);
/// CLS good / poor boundaries (unitless)
pub const CLS_THRESHOLDS: (f64, f64) = (0.1, 0.25);
/// FCP good / poor boundaries in milliseconds
pub const FCP_THRESHOLDS_MS: (f64, f64) = (1800.0, 3000.0);
/// FID good / poor boundaries in milliseconds
pub const FID_THRESHOLDS_MS: (f64, f64) = (100.0, 300.0);
/// Heuristic baseline when no speed API result is available
pub const HEURISTIC_BASELINE_SCORE: i32 = 50;
/// Mobile score at or above which a page is considered mobile-friendly
pub const MOBILE_FRIENDLY_THRESHOLD: u8 = 70;
/// Default cache TTL for analyzer results (60 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;

// HTTP status codes (for clarity and consistency)
pub const HTTP_STATUS_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_STATUS_NOT_IMPLEMENTED: u16 = 501;
