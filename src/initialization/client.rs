//! HTTP client initialization.
//!
//! This module provides functions to initialize HTTP clients with proper
//! configuration for requests and redirect handling.

use std::sync::Arc;
use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::{Config, MAX_REDIRECT_HOPS};

/// Initializes the HTTP client with default settings.
///
/// Creates a `reqwest::Client` configured with:
/// - User-Agent header from the config
/// - Per-request timeout from the config
/// - Redirect following enabled (up to `MAX_REDIRECT_HOPS`), refusing any hop
///   that fails the configured URL policy
/// - Rustls TLS backend (no native TLS)
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_client(config: &Config) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.clone())
        .redirect(guarded_redirect_policy(config))
        .build()?;
    Ok(Arc::new(client))
}

/// Follows redirects while every hop passes the URL policy.
fn guarded_redirect_policy(config: &Config) -> reqwest::redirect::Policy {
    let policy = config.url_policy();
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECT_HOPS {
            attempt.error(format!("more than {MAX_REDIRECT_HOPS} redirects"))
        } else if let Err(reason) = policy.check(attempt.url().as_str()) {
            attempt.error(reason)
        } else {
            attempt.follow()
        }
    })
}

/// Initializes a shared HTTP client for redirect resolution.
///
/// Creates a `reqwest::Client` with redirects disabled so callers can observe
/// 3xx responses and walk redirect chains one hop at a time.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_redirect_client(config: &Config) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_build_from_default_config() {
        let config = Config::default();
        assert!(init_client(&config).is_ok());
        assert!(init_redirect_client(&config).is_ok());
    }
}
