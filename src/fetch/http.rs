//! reqwest-backed `Fetcher`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Method;
use tokio::sync::Semaphore;

use super::{FetchResponse, Fetcher, RequestOptions};
use crate::config::{Config, MAX_RESPONSE_BODY_SIZE};
use crate::error_handling::{fetch_error_from_reqwest, FetchError, FetchErrorKind, InitializationError};
use crate::initialization::{init_client, init_redirect_client, init_semaphore};

const ACCEPT_VALUE: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,text/plain;q=0.8,*/*;q=0.7";

/// HTTP fetcher over two shared clients (redirect-following and manual) and a
/// semaphore bounding in-flight requests.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Arc<reqwest::Client>,
    redirect_client: Arc<reqwest::Client>,
    semaphore: Arc<Semaphore>,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Builds both clients from `config`.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::HttpClientError` if a client cannot be built.
    pub fn new(config: &Config) -> Result<Self, InitializationError> {
        Ok(Self::from_parts(
            init_client(config)?,
            init_redirect_client(config)?,
            init_semaphore(config.max_concurrency),
        ))
    }

    pub fn from_parts(
        client: Arc<reqwest::Client>,
        redirect_client: Arc<reqwest::Client>,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            client,
            redirect_client,
            semaphore,
            max_body_bytes: MAX_RESPONSE_BODY_SIZE,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| FetchError::new(FetchErrorKind::Other, url, e.to_string()))?;

        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.redirect_client
        };

        let mut builder = client
            .request(method.clone(), url)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| fetch_error_from_reqwest(url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());

        let body = if method == Method::HEAD {
            Vec::new()
        } else {
            if let Some(len) = response.content_length() {
                if len as usize > self.max_body_bytes {
                    return Err(body_too_large(url, self.max_body_bytes));
                }
            }
            let mut body = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| fetch_error_from_reqwest(url, &e))?
            {
                if body.len() + chunk.len() > self.max_body_bytes {
                    return Err(body_too_large(url, self.max_body_bytes));
                }
                body.extend_from_slice(&chunk);
            }
            body
        };

        log::debug!("{method} {url} -> {status} ({} bytes)", body.len());

        Ok(FetchResponse {
            status,
            headers,
            body,
            final_url,
        })
    }
}

fn body_too_large(url: &str, limit: usize) -> FetchError {
    FetchError::new(
        FetchErrorKind::BodyTooLarge,
        url,
        format!("response body exceeds {limit} bytes"),
    )
}

/// Flattens a header map into lower-cased names, joining repeated values.
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FetchError> {
        self.send(Method::GET, url, options).await
    }

    async fn head(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, FetchError> {
        self.send(Method::HEAD, url, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_collect_headers_joins_repeats() {
        let mut map = HeaderMap::new();
        map.append("Set-Cookie", HeaderValue::from_static("a=1"));
        map.append("Set-Cookie", HeaderValue::from_static("b=2"));
        map.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        let headers = collect_headers(&map);
        assert_eq!(headers.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(headers.get("x-frame-options").map(String::as_str), Some("DENY"));
    }

    #[test]
    fn test_http_fetcher_builds_from_config() {
        assert!(HttpFetcher::new(&Config::default()).is_ok());
    }
}
