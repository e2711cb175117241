//! Canned-response `Fetcher` for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{FetchResponse, Fetcher, RequestOptions};
use crate::error_handling::{FetchError, FetchErrorKind};

type Route = (String, String);

/// Serves responses registered per `(method, url)`. Unregistered routes fail
/// with a connect error, like an unreachable host.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    routes: HashMap<Route, Result<FetchResponse, FetchError>>,
    calls: Mutex<HashMap<Route, usize>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn status(code: u16) -> FetchResponse {
        FetchResponse {
            status: code,
            ..Default::default()
        }
    }

    pub(crate) fn body(code: u16, body: &str) -> FetchResponse {
        FetchResponse {
            status: code,
            body: body.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn redirect(code: u16, location: &str) -> FetchResponse {
        Self::with_headers(Self::status(code), &[("location", location)])
    }

    pub(crate) fn with_headers(mut response: FetchResponse, headers: &[(&str, &str)]) -> FetchResponse {
        for (name, value) in headers {
            response
                .headers
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
        response
    }

    pub(crate) fn on_get(mut self, url: &str, response: FetchResponse) -> Self {
        self.routes
            .insert(("GET".to_string(), url.to_string()), Ok(response));
        self
    }

    pub(crate) fn on_head(mut self, url: &str, response: FetchResponse) -> Self {
        self.routes
            .insert(("HEAD".to_string(), url.to_string()), Ok(response));
        self
    }

    /// Registers the same response for GET and HEAD (HEAD gets no body).
    pub(crate) fn on_both(self, url: &str, response: FetchResponse) -> Self {
        let head = FetchResponse {
            body: Vec::new(),
            ..response.clone()
        };
        self.on_get(url, response).on_head(url, head)
    }

    pub(crate) fn on_get_error(mut self, url: &str, kind: FetchErrorKind) -> Self {
        self.routes.insert(
            ("GET".to_string(), url.to_string()),
            Err(FetchError::new(kind, url, "simulated failure")),
        );
        self
    }

    pub(crate) fn calls(&self, method: &str, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(method.to_string(), url.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn serve(&self, method: &str, url: &str) -> Result<FetchResponse, FetchError> {
        let route = (method.to_string(), url.to_string());
        *self.calls.lock().unwrap().entry(route.clone()).or_insert(0) += 1;
        match self.routes.get(&route) {
            Some(Ok(response)) => {
                let mut response = response.clone();
                if response.final_url.is_empty() {
                    response.final_url = url.to_string();
                }
                Ok(response)
            }
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::new(
                FetchErrorKind::Connect,
                url,
                "connection refused",
            )),
        }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get(&self, url: &str, _options: &RequestOptions) -> Result<FetchResponse, FetchError> {
        self.serve("GET", url)
    }

    async fn head(
        &self,
        url: &str,
        _options: &RequestOptions,
    ) -> Result<FetchResponse, FetchError> {
        self.serve("HEAD", url)
    }
}
