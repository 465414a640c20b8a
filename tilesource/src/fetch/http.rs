//! HTTP resource fetching.
//!
//! [`ResourceFetcher`] is the seam between the tile pipeline and the
//! network. [`ReqwestFetcher`] is the production implementation; tests use
//! [`tests::MockFetcher`].

use super::request::Request;
use crate::error::SourceError;
use crate::tile::ExpiryData;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default User-Agent string for HTTP requests.
pub const DEFAULT_USER_AGENT: &str = concat!("tilesource/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// A fetched response body together with its caching headers.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    /// Final request URL
    pub url: String,
    /// Response body
    pub data: Bytes,
    /// Caching headers
    pub expiry: ExpiryData,
    /// Wall time spent on the request
    pub elapsed: Duration,
}

impl FetchedResource {
    /// Creates a resource with no caching headers.
    pub fn new(url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            data: data.into(),
            expiry: ExpiryData::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the caching headers.
    pub fn with_expiry(mut self, expiry: ExpiryData) -> Self {
        self.expiry = expiry;
        self
    }
}

/// Boxed future returned by [`ResourceFetcher::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FetchedResource, SourceError>> + Send + 'a>>;

/// Performs network fetches.
///
/// Implementations must map a 404 response to [`SourceError::NotFound`] and
/// every other failure to [`SourceError::Network`]. Dropping the returned
/// future cancels the request.
pub trait ResourceFetcher: Send + Sync {
    /// Fetches a resource.
    fn fetch<'a>(&'a self, request: &'a Request) -> FetchFuture<'a>;
}

/// Fetches a resource and deserializes its body as JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn ResourceFetcher,
    request: &Request,
) -> Result<T, SourceError> {
    let resource = fetcher.fetch(request).await?;
    serde_json::from_slice(&resource.data)
        .map_err(|e| SourceError::Parse(format!("invalid JSON from {}: {}", request.url, e)))
}

/// Async HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with the default timeout and User-Agent.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_options(DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT)
    }

    /// Creates a fetcher with a custom timeout and User-Agent.
    pub fn with_options(timeout_secs: u64, user_agent: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            // Tiles for one view come from a handful of hosts
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                SourceError::network("", format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

impl ResourceFetcher for ReqwestFetcher {
    fn fetch<'a>(&'a self, request: &'a Request) -> FetchFuture<'a> {
        Box::pin(async move {
            let url = request.url.as_str();
            trace!(url = url, "HTTP GET request starting");
            let started = Instant::now();

            let mut builder = self.client.get(url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = match builder.send().await {
                Ok(resp) => {
                    debug!(
                        url = url,
                        status = resp.status().as_u16(),
                        "HTTP response received"
                    );
                    resp
                }
                Err(e) => {
                    warn!(
                        url = url,
                        error = %e,
                        is_connect = e.is_connect(),
                        is_timeout = e.is_timeout(),
                        "HTTP request failed"
                    );
                    return Err(SourceError::network(url, format!("request failed: {}", e)));
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                debug!(url = url, "HTTP 404");
                return Err(SourceError::NotFound {
                    url: url.to_string(),
                });
            }
            if !status.is_success() {
                warn!(url = url, status = status.as_u16(), "HTTP error status");
                return Err(SourceError::Network {
                    url: url.to_string(),
                    status: Some(status.as_u16()),
                    message: format!("HTTP {}", status),
                });
            }

            let header = |name: reqwest::header::HeaderName| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let expiry = ExpiryData {
                cache_control: header(reqwest::header::CACHE_CONTROL),
                expires: header(reqwest::header::EXPIRES),
            };

            match response.bytes().await {
                Ok(data) => {
                    trace!(url = url, bytes = data.len(), "HTTP response body read");
                    Ok(FetchedResource {
                        url: url.to_string(),
                        data,
                        expiry,
                        elapsed: started.elapsed(),
                    })
                }
                Err(e) => {
                    warn!(url = url, error = %e, "Failed to read response body");
                    Err(SourceError::network(
                        url,
                        format!("failed to read response: {}", e),
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    /// Mock fetcher with canned per-URL responses.
    ///
    /// When gated, every fetch waits for a permit released by
    /// [`MockFetcher::release`], so tests can hold requests in flight.
    #[derive(Default)]
    pub struct MockFetcher {
        responses: Mutex<HashMap<String, Result<FetchedResource, SourceError>>>,
        calls: Mutex<Vec<String>>,
        started: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fetches block until released.
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::default()
            }
        }

        pub fn respond(&self, url: &str, response: Result<FetchedResource, SourceError>) {
            self.responses.lock().insert(url.to_string(), response);
        }

        pub fn respond_bytes(&self, url: &str, body: &'static [u8]) {
            self.respond(url, Ok(FetchedResource::new(url, Bytes::from_static(body))));
        }

        pub fn respond_json(&self, url: &str, body: serde_json::Value) {
            self.respond(
                url,
                Ok(FetchedResource::new(url, body.to_string().into_bytes())),
            );
        }

        /// Lets `n` gated fetches complete.
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        /// URLs of every fetch that started, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    impl ResourceFetcher for MockFetcher {
        fn fetch<'a>(&'a self, request: &'a Request) -> FetchFuture<'a> {
            Box::pin(async move {
                self.calls.lock().push(request.url.clone());
                self.started.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    let permit = gate.acquire().await.expect("gate closed");
                    permit.forget();
                }
                self.responses
                    .lock()
                    .get(&request.url)
                    .cloned()
                    .unwrap_or_else(|| {
                        Err(SourceError::NotFound {
                            url: request.url.clone(),
                        })
                    })
            })
        }
    }

    #[tokio::test]
    async fn test_mock_fetcher_returns_canned_body() {
        let fetcher = MockFetcher::new();
        fetcher.respond_bytes("https://t.example.com/1", b"abc");

        let resource = fetcher
            .fetch(&Request::new("https://t.example.com/1"))
            .await
            .unwrap();
        assert_eq!(&resource.data[..], b"abc");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fetcher_unknown_url_is_404() {
        let fetcher = MockFetcher::new();
        let err = fetcher
            .fetch(&Request::new("https://t.example.com/missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_json_parses_body() {
        let fetcher = MockFetcher::new();
        fetcher.respond_json(
            "https://t.example.com/a.json",
            serde_json::json!({ "minzoom": 2 }),
        );
        let value: serde_json::Value =
            fetch_json(&fetcher, &Request::new("https://t.example.com/a.json"))
                .await
                .unwrap();
        assert_eq!(value["minzoom"], 2);
    }

    #[tokio::test]
    async fn test_fetch_json_reports_parse_error() {
        let fetcher = MockFetcher::new();
        fetcher.respond_bytes("https://t.example.com/bad.json", b"{not json");
        let err = fetch_json::<serde_json::Value>(
            &fetcher,
            &Request::new("https://t.example.com/bad.json"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_reqwest_fetcher_builds() {
        assert!(ReqwestFetcher::with_options(5, "tilesource-test").is_ok());
    }
}
