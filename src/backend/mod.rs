//! Transport abstraction for the upload connection
//!
//! The uploader drives a [`Connection`] through a fixed sequence: headers,
//! body, finish, then optionally the response body. [`ReqwestTransport`] is
//! the production implementation; [`memory::MemoryTransport`] records
//! requests in memory and can be scripted to fail at any step.

pub mod memory;
pub mod reqwest;

pub use self::reqwest::ReqwestTransport;

use crate::Result;
use http::{Method, StatusCode};
use std::io::Write;
use std::time::Duration;
use url::Url;

/// Proxy configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Username for proxy authentication
    pub username: Option<String>,
    /// Password for proxy authentication
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy without authentication
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Add basic proxy credentials
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Configuration for transport creation
#[derive(Clone, Debug, Default)]
pub struct TransportConfig {
    /// Whole-request timeout
    pub timeout: Option<Duration>,
    /// Connect timeout
    pub connect_timeout: Option<Duration>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Whether to ignore certificate errors
    pub ignore_certificate_errors: Option<bool>,
    /// Headers added to every request before caller headers
    pub default_headers: Option<http::HeaderMap>,
    /// HTTP proxy configuration
    pub http_proxy: Option<ProxyConfig>,
    /// HTTPS proxy configuration
    pub https_proxy: Option<ProxyConfig>,
}

/// Status line of a finished request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: StatusCode,
    /// Reason phrase for the status
    pub reason: String,
}

impl ResponseHead {
    /// Head with the canonical reason phrase for `status`
    pub fn new(status: StatusCode) -> Self {
        Self::with_reason(status, None)
    }

    /// Head with the reason phrase the server sent, falling back to the
    /// canonical phrase when there was none
    pub fn with_reason(status: StatusCode, reason: Option<&str>) -> Self {
        let reason = reason
            .filter(|reason| !reason.is_empty())
            .or_else(|| status.canonical_reason())
            .unwrap_or("");
        Self {
            status,
            reason: reason.to_string(),
        }
    }
}

/// Opens connections
pub trait Transport: Send + Sync {
    /// Open a connection for `method` on `url`. No bytes need to be sent yet.
    fn open(&self, url: &Url, method: &Method) -> Result<Box<dyn Connection>>;
}

/// One request/response exchange
///
/// Dropping a connection before [`finish`](Connection::finish) must abort
/// the request rather than complete it with a truncated body.
pub trait Connection: Send {
    /// Set a request header, replacing any earlier value for the same name.
    fn set_header(&mut self, name: &str, value: &str) -> Result<()>;

    /// Sink for the request body. Headers are frozen from the first call.
    fn body(&mut self) -> Result<&mut dyn Write>;

    /// Flush and close the body, then wait for the response status.
    fn finish(&mut self) -> Result<ResponseHead>;

    /// Read the full response body as text. Only valid after `finish`.
    fn read_body(&mut self) -> Result<String>;
}
