//! Application initialization and resource setup.
//!
//! This module provides functions to initialize shared resources:
//! - Logger (plain or JSON)
//! - HTTP clients (redirect-following and manual-redirect)
//! - Outbound concurrency semaphore
//! - rustls crypto provider
//!
//! All initialization functions return proper error types for error handling.

mod client;
mod logger;

use std::sync::Arc;

use rustls::crypto::{ring::default_provider, CryptoProvider};
use tokio::sync::Semaphore;

// Re-export public API
pub use client::{init_client, init_redirect_client};
pub use logger::init_logger_with;

/// Initializes a semaphore for controlling concurrency.
///
/// Every outbound request made through the HTTP fetcher holds one permit, so
/// this bounds the total number of in-flight requests across all analyzers.
///
/// # Arguments
///
/// * `count` - Maximum number of concurrent operations allowed
pub fn init_semaphore(count: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(count.max(1)))
}

/// Initializes the crypto provider for TLS operations.
///
/// Configures the global crypto provider for `rustls`. This must be called before
/// any TLS connections are established.
pub fn init_crypto_provider() {
    // The return value is ignored because reinstalling the provider is harmless
    let _ = CryptoProvider::install_default(default_provider());
}
