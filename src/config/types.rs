//! Configuration types.
//!
//! This module defines the library configuration, the logging enums shared
//! with the CLI, and the weight table used to blend analyzer scores.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_PAGESPEED_ENDPOINT, DEFAULT_USER_AGENT, PAGESPEED_TIMEOUT_SECS,
    TLS_HANDSHAKE_TIMEOUT_SECS,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Weight of each analyzer in the overall technical score.
///
/// Weights are renormalized over the analyzers that actually produced a
/// score, so they need not sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub page_speed: f64,
    pub mobile_optimization: f64,
    pub security: f64,
    pub sitemap_analysis: f64,
    pub canonical_urls: f64,
    pub structured_data: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            page_speed: 20.0,
            mobile_optimization: 15.0,
            security: 20.0,
            sitemap_analysis: 15.0,
            canonical_urls: 15.0,
            structured_data: 15.0,
        }
    }
}

/// Library configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use seo_audit::Config;
///
/// let config = Config {
///     timeout_seconds: 20,
///     pagespeed_api_key: Some("my-key".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// TCP connect + TLS handshake budget for certificate inspection, in seconds
    pub tls_timeout_seconds: u64,

    /// Per-run timeout for the PageSpeed API, in seconds
    pub pagespeed_timeout_seconds: u64,

    /// HTTP User-Agent header value
    pub user_agent: String,

    /// Maximum concurrent outbound HTTP requests
    pub max_concurrency: usize,

    /// PageSpeed Insights API key; the speed API is only used when set
    pub pagespeed_api_key: Option<String>,

    /// PageSpeed Insights endpoint
    pub pagespeed_endpoint: String,

    /// Time-to-live for cached analyzer results, in seconds
    pub cache_ttl_secs: u64,

    /// How many levels of sitemap indexes to expand (0 = report children only)
    pub max_sitemap_index_depth: usize,

    /// Overall-score weight table
    pub weights: ScoreWeights,

    /// Allow discovered URLs on private / loopback hosts (staging audits, tests)
    pub allow_private_targets: bool,
}

impl Config {
    /// The SSRF policy applied to every URL discovered during an audit.
    pub fn url_policy(&self) -> crate::security::UrlPolicy {
        if self.allow_private_targets {
            crate::security::UrlPolicy::permissive()
        } else {
            crate::security::UrlPolicy::strict()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECS,
            tls_timeout_seconds: TLS_HANDSHAKE_TIMEOUT_SECS,
            pagespeed_timeout_seconds: PAGESPEED_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            pagespeed_api_key: None,
            pagespeed_endpoint: DEFAULT_PAGESPEED_ENDPOINT.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_sitemap_index_depth: 0,
            weights: ScoreWeights::default(),
            allow_private_targets: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_default_weights_sum_to_100() {
        let w = ScoreWeights::default();
        let total = w.page_speed
            + w.mobile_optimization
            + w.security
            + w.sitemap_analysis
            + w.canonical_urls
            + w.structured_data;
        assert!((total - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_default_has_no_pagespeed_key() {
        let config = Config::default();
        assert!(config.pagespeed_api_key.is_none());
        assert_eq!(config.max_sitemap_index_depth, 0);
        assert_eq!(config.timeout_seconds, DEFAULT_HTTP_TIMEOUT_SECS);
        assert_eq!(config.url_policy(), crate::security::UrlPolicy::strict());
    }
}
