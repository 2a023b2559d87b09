//! HTTP transport port.
//!
//! The rest of the crate speaks [`HttpRequest`]/[`HttpResponse`] and sees
//! failures already classified as [`TransportError`]. [`ReqwestTransport`]
//! is the production implementation.

use async_trait::async_trait;
use psnsync_core::{ParseError, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECTION_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeatable header such as `set-cookie`.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Result<serde_json::Value, ParseError> {
        serde_json::from_str(&self.body).map_err(|e| ParseError::Malformed {
            reason: format!("invalid JSON body: {}", e),
        })
    }
}

/// Raw HTTP transport.
///
/// Implementations classify non-success statuses into [`TransportError`]
/// (see [`classify_status`]) and must not follow redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release the underlying session. Later requests fail.
    async fn close(&self);
}

/// Map an HTTP status to the transport error taxonomy.
pub fn classify_status(status: u16) -> Result<(), TransportError> {
    match status {
        200..=399 => Ok(()),
        401 => Err(TransportError::AuthRejected),
        403 => Err(TransportError::AccessDenied),
        408 | 504 => Err(TransportError::Timeout),
        503 => Err(TransportError::Unavailable),
        status => Err(TransportError::Backend { status }),
    }
}

// ============================================================================
// REQWEST TRANSPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub connection_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connection_limit: DEFAULT_CONNECTION_LIMIT,
        }
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    closed: AtomicBool,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.connection_limit)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Network {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Network {
                reason: "transport closed".to_string(),
            });
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        classify_status(status)?;
        let body = response.text().await.map_err(classify_reqwest_error)?;

        tracing::debug!(url = %request.url, status, "Response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
