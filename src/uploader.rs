//! Upload orchestration
//!
//! [`Uploader`] owns the collaborators of an upload (transport, path
//! resolver, image codec) and drives one request at a time through
//! `Idle → Connected → HeadersSent → BodyStreaming → ResponseReceived`,
//! ending in exactly one [`UploadResult`].

use crate::backend::{ProxyConfig, ReqwestTransport, Transport, TransportConfig};
use crate::imaging::{ImageCodec, RustCodec};
use crate::multipart::{self, MAX_CHUNK_SIZE, MultipartEncoder};
use crate::options::UploadOptions;
use crate::request::{UploadRequest, UploadRequestBuilder};
use crate::resolver::{FsResolver, MediaIndex, PathResolver};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    /// The server answered 200
    Success {
        /// Always 200
        status: u16,
        /// Response body with line terminators removed
        body: String,
    },
    /// Anything else. `message` starts with `"Error happened: "`.
    Failure {
        /// Human-readable failure description
        message: String,
    },
}

impl UploadResult {
    /// Failure outcome for `error`
    pub fn from_error(error: &Error) -> Self {
        UploadResult::Failure {
            message: error.failure_message(),
        }
    }

    /// Whether this is a success
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success { .. })
    }
}

impl From<Result<UploadResult>> for UploadResult {
    fn from(result: Result<UploadResult>) -> Self {
        result.unwrap_or_else(|e| UploadResult::from_error(&e))
    }
}

/// Position of a request in the upload state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Idle,
    Connected,
    HeadersSent,
    BodyStreaming,
    ResponseReceived,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Connected => "connected",
            Stage::HeadersSent => "headers sent",
            Stage::BodyStreaming => "body streaming",
            Stage::ResponseReceived => "response received",
        };
        f.write_str(name)
    }
}

/// Streams multipart uploads
///
/// Cloning is cheap; clones share the transport, resolver and codec.
///
/// # Examples
///
/// ```rust,no_run
/// use frakt_upload::{FilePart, UploadRequest, UploadResult, Uploader};
///
/// # #[tokio::main]
/// # async fn main() -> frakt_upload::Result<()> {
/// let uploader = Uploader::new()?;
/// let request = UploadRequest::builder("https://example.com/upload")
///     .field("album", "holiday")
///     .file(FilePart::new("/tmp/photo.jpg").name("photo").filename("photo.jpg"));
///
/// match uploader.upload(request).await {
///     UploadResult::Success { body, .. } => println!("uploaded: {body}"),
///     UploadResult::Failure { message } => eprintln!("{message}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Uploader {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn PathResolver>,
    codec: Arc<dyn ImageCodec>,
    chunk_size: usize,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Create an uploader with the reqwest transport and default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create an uploader builder
    pub fn builder() -> UploaderBuilder {
        UploaderBuilder::new()
    }

    /// Run one upload to completion on the current thread.
    ///
    /// This blocks on network I/O. With [`ReqwestTransport`] it must be
    /// called from a thread that may block inside a tokio runtime, such as a
    /// `spawn_blocking` worker. Prefer [`upload`](Self::upload).
    pub fn execute(&self, request: UploadRequestBuilder) -> UploadResult {
        let result = request.build().and_then(|request| self.run(&request));
        match &result {
            Ok(UploadResult::Success { status, body }) => {
                tracing::info!(status, bytes = body.len(), "upload completed");
            }
            Ok(UploadResult::Failure { message }) => {
                tracing::warn!(%message, "upload failed");
            }
            Err(e) => tracing::warn!(error = %e, "upload failed"),
        }
        result.into()
    }

    /// Run an upload described by a host options map
    pub fn execute_options(&self, options: serde_json::Value) -> UploadResult {
        match UploadOptions::from_value(options).and_then(UploadOptions::into_request) {
            Ok(request) => self.execute(request),
            Err(e) => {
                tracing::warn!(error = %e, "rejected upload options");
                UploadResult::from_error(&e)
            }
        }
    }

    /// Run an upload on tokio's blocking pool
    pub async fn upload(&self, request: UploadRequestBuilder) -> UploadResult {
        let uploader = self.clone();
        join_outcome(tokio::task::spawn_blocking(move || uploader.execute(request)).await)
    }

    /// Run an upload in the background and hand the outcome to `callback`.
    ///
    /// `callback` runs exactly once. Outside a tokio runtime the upload cannot
    /// start and `callback` receives a failure immediately.
    pub fn upload_with_callback<F>(&self, request: UploadRequestBuilder, callback: F)
    where
        F: FnOnce(UploadResult) + Send + 'static,
    {
        self.spawn_with_callback(move |uploader| uploader.execute(request), callback);
    }

    /// Host bridge entry point: parse `options`, upload, and report through
    /// `callback` as `(error message, null)` or `(null, {data, status})`.
    pub fn upload_options<F>(&self, options: serde_json::Value, callback: F)
    where
        F: FnOnce(Option<String>, Option<serde_json::Value>) + Send + 'static,
    {
        self.spawn_with_callback(
            move |uploader| uploader.execute_options(options),
            move |result| {
                let (error, response) = result.into_callback_args();
                callback(error, response);
            },
        );
    }

    fn spawn_with_callback<J, F>(&self, job: J, callback: F)
    where
        J: FnOnce(&Uploader) -> UploadResult + Send + 'static,
        F: FnOnce(UploadResult) + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let error = Error::Internal(format!("No tokio runtime available: {}", e));
                tracing::error!(error = %error, "cannot start upload");
                callback(UploadResult::from_error(&error));
                return;
            }
        };

        // Fired from the blocking job itself; nothing async awaits it.
        let completion = Completion::new(callback);
        let uploader = self.clone();
        handle.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&uploader)));
            completion.fire(outcome.unwrap_or_else(|_| {
                let error = Error::Internal("upload task panicked".to_string());
                tracing::error!(error = %error, "upload task did not complete");
                UploadResult::from_error(&error)
            }));
        });
    }

    fn run(&self, request: &UploadRequest) -> Result<UploadResult> {
        let mut stage = Stage::Idle;
        self.advance(request, &mut stage).inspect_err(|e| {
            tracing::debug!(stage = %stage, error = %e, "upload aborted");
        })
    }

    fn advance(&self, request: &UploadRequest, stage: &mut Stage) -> Result<UploadResult> {
        let boundary = multipart::generate_boundary();

        let mut conn = self.transport.open(request.url(), request.method())?;
        *stage = Stage::Connected;

        for (name, value) in request.headers() {
            conn.set_header(name, value)?;
        }
        conn.set_header("Connection", "Keep-Alive")?;
        conn.set_header("Content-Type", &multipart::content_type(&boundary))?;
        tracing::debug!(headers = request.headers().len(), "applied headers");
        *stage = Stage::HeadersSent;

        {
            let sink = conn.body()?;
            *stage = Stage::BodyStreaming;
            let encoder =
                MultipartEncoder::new(&boundary, self.resolver.as_ref(), self.codec.as_ref())
                    .chunk_size(self.chunk_size);
            let sink = encoder.encode(sink, request.fields(), request.files())?;
            sink.flush()?;
        }

        let head = conn.finish()?;
        *stage = Stage::ResponseReceived;
        tracing::debug!(status = head.status.as_u16(), "response status");

        if head.status != StatusCode::OK {
            return Ok(UploadResult::from_error(&Error::Status {
                code: head.status.as_u16(),
                reason: head.reason,
            }));
        }

        let text = conn.read_body()?;
        Ok(UploadResult::Success {
            status: head.status.as_u16(),
            body: strip_line_breaks(&text),
        })
    }
}

/// Concatenate the lines of `text`, dropping `\r` and `\n`.
fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Completion handler that fires exactly once.
///
/// Dropped unfired (a queued job discarded at runtime shutdown), it reports
/// a cancellation failure.
struct Completion<F: FnOnce(UploadResult)> {
    callback: Option<F>,
}

impl<F: FnOnce(UploadResult)> Completion<F> {
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn fire(mut self, result: UploadResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<F: FnOnce(UploadResult)> Drop for Completion<F> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let error = Error::Internal("upload cancelled before it ran".to_string());
            tracing::warn!(error = %error, "upload never started");
            callback(UploadResult::from_error(&error));
        }
    }
}

fn join_outcome(joined: std::result::Result<UploadResult, tokio::task::JoinError>) -> UploadResult {
    joined.unwrap_or_else(|e| {
        let error = if e.is_panic() {
            Error::Internal("upload task panicked".to_string())
        } else {
            Error::Internal(format!("upload task failed: {}", e))
        };
        tracing::error!(error = %error, "upload task did not complete");
        UploadResult::from_error(&error)
    })
}

/// Builder for [`Uploader`]
pub struct UploaderBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: TransportConfig,
    default_headers: Vec<(String, String)>,
    resolver: Option<Arc<dyn PathResolver>>,
    codec: Option<Arc<dyn ImageCodec>>,
    chunk_size: usize,
}

impl UploaderBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            transport: None,
            config: TransportConfig::default(),
            default_headers: Vec::new(),
            resolver: None,
            codec: None,
            chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Use a custom transport. Transport settings on this builder are then
    /// ignored.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the whole reqwest transport configuration
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the whole-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Add a header sent with every request. Caller headers override it.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Ignore certificate errors (not recommended for production)
    pub fn ignore_certificate_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_certificate_errors = Some(ignore);
        self
    }

    /// Route plain HTTP through a proxy
    pub fn http_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.http_proxy = Some(proxy);
        self
    }

    /// Route HTTPS through a proxy
    pub fn https_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.https_proxy = Some(proxy);
        self
    }

    /// Use a custom path resolver
    pub fn resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Use the filesystem resolver backed by `index` for `content` references
    pub fn media_index(self, index: impl MediaIndex + 'static) -> Self {
        self.resolver(FsResolver::with_media_index(index))
    }

    /// Use a custom image codec
    pub fn codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Raw file copy chunk size in bytes (at least one)
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Build the uploader
    pub fn build(self) -> Result<Uploader> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut config = self.config;
                if !self.default_headers.is_empty() {
                    let mut headers = config.default_headers.take().unwrap_or_else(HeaderMap::new);
                    for (name, value) in &self.default_headers {
                        headers.insert(parse_header_name(name)?, parse_header_value(name, value)?);
                    }
                    config.default_headers = Some(headers);
                }
                Arc::new(ReqwestTransport::with_config(config)?)
            }
        };

        Ok(Uploader {
            transport,
            resolver: self.resolver.unwrap_or_else(|| Arc::new(FsResolver::new())),
            codec: self.codec.unwrap_or_else(|| Arc::new(RustCodec::new())),
            chunk_size: self.chunk_size,
        })
    }
}

impl Default for UploaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}
