//! Outbound HTTP for the analyzers.
//!
//! Analyzers never talk to `reqwest` directly. They go through the [`Fetcher`]
//! trait so tests can substitute canned responses, and so every request made
//! during one audit shares one concurrency limit.
//!
//! - [`HttpFetcher`]: the reqwest-backed implementation
//! - [`probe`]: lightweight existence check (HEAD with GET fallback)
//! - [`walk_redirect_chain`]: manual, SSRF-checked redirect following
//! - [`decode_body`]: gzip detection with a decompression bound

mod body;
mod http;
mod redirects;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{HTTP_STATUS_METHOD_NOT_ALLOWED, HTTP_STATUS_NOT_IMPLEMENTED};
use crate::error_handling::FetchError;

pub use body::{decode_body, is_gzip};
pub use http::HttpFetcher;
pub use redirects::{walk_redirect_chain, RedirectChain, RedirectHop};

/// Per-request knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub follow_redirects: bool,
    /// Overrides the client-wide timeout for this request.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn follow() -> Self {
        Self {
            follow_redirects: true,
            timeout: None,
        }
    }

    pub fn no_follow() -> Self {
        Self {
            follow_redirects: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::follow()
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lower-cased; repeated headers are joined with ", ".
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub final_url: String,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Abstraction over the HTTP client.
///
/// Non-2xx statuses are successful fetches; only transport failures (and
/// SSRF refusals) are `Err`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FetchError>;

    async fn head(&self, url: &str, options: &RequestOptions)
        -> Result<FetchResponse, FetchError>;
}

/// Checks that `url` exists without downloading it when possible.
///
/// Sends HEAD and retries with GET when the server rejects the method
/// (405/501), since many servers do not implement HEAD.
pub async fn probe(
    fetcher: &dyn Fetcher,
    url: &str,
    options: &RequestOptions,
) -> Result<FetchResponse, FetchError> {
    let response = fetcher.head(url, options).await?;
    if response.status == HTTP_STATUS_METHOD_NOT_ALLOWED
        || response.status == HTTP_STATUS_NOT_IMPLEMENTED
    {
        log::debug!("HEAD not supported for {url} ({}), retrying with GET", response.status);
        return fetcher.get(url, options).await;
    }
    Ok(response)
}
