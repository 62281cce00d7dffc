//! HTTP transport with bounded retries
//!
//! This module handles every request the harvester sends, including:
//! - Building the HTTP client with the portal's XHR headers
//! - Form-encoded POSTs and query-encoded GETs
//! - Exponential backoff with jitter between attempts
//! - Classifying failures as retryable or terminal
//!
//! Callers treat any `Err` as "no data from this endpoint".

mod retry;

pub use retry::RetryPolicy;

use crate::config::RemoteConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of body characters echoed into logs
const LOG_SNIPPET_CHARS: usize = 200;

/// Endpoint paths relative to the reports base URL
pub mod paths {
    pub const SDP_LIST: &str = "sdplist/sdplist_Processing.php";
    pub const DATASOURCE: &str = "sdpdataviewer/form2_view_datasource.php";
    pub const VIEW: &str = "sdpdataviewer/form2_view.php";
    pub const EXCEL: &str = "sdpdataviewer/form2_view_excel.php";
}

/// Errors raised while talking to the portal
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {status}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP verb of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request against the portal
///
/// POST parameters are sent form-encoded; GET parameters go in the query string.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl Request {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter, preserving insertion order
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of a single attempt, before retry policy is applied
enum Attempt {
    Done(RawResponse),
    Retry(TransportError),
    Fatal(TransportError),
}

/// Builds the HTTP client used for every portal request
pub fn build_http_client(config: &RemoteConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(
        "X-Requested-With",
        HeaderValue::from_static("XMLHttpRequest"),
    );

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Resolves an endpoint path against a base URL
///
/// A missing trailing slash on the base is tolerated.
pub fn endpoint(base: &str, path: &str) -> Result<String, TransportError> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let base = Url::parse(&base).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base, e)))?;
    base.join(path)
        .map(|u| u.to_string())
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", path, e)))
}

/// Retrying HTTP executor
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
}

impl Transport {
    /// Builds a transport from the remote configuration
    pub fn new(config: &RemoteConfig) -> Result<Self, TransportError> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, RetryPolicy::from_config(config)))
    }

    fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Executes a request, retrying retryable failures with backoff
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return the response |
    /// | 404, 500, 502, 503, 504 | Retry with backoff |
    /// | Timeout | Retry with backoff |
    /// | Connection error | Retry with backoff |
    /// | Any other status | Fail immediately |
    pub async fn execute(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let max_attempts = self.policy.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.attempt(request, attempt).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retry(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        tracing::debug!(
                            "Retrying {} in {:?} (attempt {}/{})",
                            request.url,
                            delay,
                            attempt + 1,
                            max_attempts
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            "Giving up on {} after {} attempts: {}",
            request.url,
            max_attempts,
            last_error
        );
        Err(TransportError::Exhausted {
            attempts: max_attempts,
            last: last_error,
        })
    }

    /// Single GET without retries; any HTTP answer counts as reachable
    pub async fn probe(&self, url: &str) -> Result<u16, TransportError> {
        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(TransportError::Timeout),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Request(e.to_string())),
        }
    }

    async fn attempt(&self, request: &Request, attempt: u32) -> Attempt {
        let builder = match request.method {
            Method::Post => self.client.post(&request.url).form(&request.params),
            Method::Get => self.client.get(&request.url).query(&request.params),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Attempt {} for {} failed: {}", attempt + 1, request.url, e);
                return classify_reqwest_error(e);
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                tracing::debug!(
                    "Attempt {} for {} failed reading body: {}",
                    attempt + 1,
                    request.url,
                    e
                );
                return classify_reqwest_error(e);
            }
        };

        let raw = RawResponse {
            status,
            content_type,
            body,
        };
        tracing::debug!(
            "Attempt {} for {} -> {}: {}",
            attempt + 1,
            request.url,
            status,
            snippet(&raw.text())
        );

        if (200..300).contains(&status) {
            Attempt::Done(raw)
        } else {
            let err = TransportError::Status {
                status,
                body: snippet(&raw.text()),
            };
            if self.policy.is_retryable_status(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            }
        }
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> Attempt {
    if error.is_timeout() {
        Attempt::Retry(TransportError::Timeout)
    } else if error.is_connect() {
        Attempt::Retry(TransportError::Connect(error.to_string()))
    } else if error.is_body() || error.is_request() {
        // Dropped connections mid-transfer surface as body/request errors
        Attempt::Retry(TransportError::Request(error.to_string()))
    } else {
        Attempt::Fatal(TransportError::Request(error.to_string()))
    }
}

/// Truncates text for log output
pub fn snippet(text: &str) -> String {
    if text.chars().count() <= LOG_SNIPPET_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LOG_SNIPPET_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://example.org/reports/", "sdplist/x.php").unwrap(),
            "https://example.org/reports/sdplist/x.php"
        );
        assert_eq!(
            endpoint("https://example.org/reports", "sdplist/x.php").unwrap(),
            "https://example.org/reports/sdplist/x.php"
        );
        assert!(endpoint("not a url", "x.php").is_err());
    }

    #[test]
    fn test_request_builder_keeps_order() {
        let request = Request::post("http://localhost/x")
            .param("operation", "getUnionList")
            .param("Year", "2023");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.params[0].0, "operation");
        assert_eq!(request.params[1], ("Year".to_string(), "2023".to_string()));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(500);
        let cut = snippet(&long);
        assert_eq!(cut.len(), LOG_SNIPPET_CHARS + 3);
        assert_eq!(snippet("short"), "short");
    }
}
