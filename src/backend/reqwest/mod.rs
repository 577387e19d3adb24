//! Reqwest transport
//!
//! The multipart encoder is synchronous and writes into a [`Write`] sink,
//! while reqwest wants an async body stream. [`ChannelWriter`] bridges the
//! two: encoder writes are batched into chunks and pushed through a bounded
//! channel that backs a `reqwest::Body::wrap_stream`. The request future runs
//! on the tokio runtime while the encoder blocks on the channel, so at most
//! a few chunks are ever held in memory.
//!
//! Connections must be driven from a thread that may block, such as one of
//! tokio's blocking pool threads.

mod body;

pub use body::ChannelWriter;

use super::{Connection, ResponseHead, Transport, TransportConfig};
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::io::Write;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Chunks in flight between the encoder and the request future
const CHANNEL_CAPACITY: usize = 4;

/// Bytes batched before a chunk is handed to the request future
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Reqwest transport for cross-platform HTTP
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new Reqwest transport
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// Create a new Reqwest transport with configuration
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(ignore_certs) = config.ignore_certificate_errors {
            builder = builder.danger_accept_invalid_certs(ignore_certs);
        }

        if let Some(default_headers) = config.default_headers {
            builder = builder.default_headers(default_headers);
        }

        if let Some(http_proxy) = config.http_proxy {
            let proxy_url = format!("http://{}:{}", http_proxy.host, http_proxy.port);
            let mut proxy = reqwest::Proxy::http(&proxy_url)
                .map_err(|e| Error::Internal(format!("Invalid HTTP proxy: {}", e)))?;

            if let (Some(username), Some(password)) = (&http_proxy.username, &http_proxy.password) {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        if let Some(https_proxy) = config.https_proxy {
            let proxy_url = format!("https://{}:{}", https_proxy.host, https_proxy.port);
            let mut proxy = reqwest::Proxy::https(&proxy_url)
                .map_err(|e| Error::Internal(format!("Invalid HTTPS proxy: {}", e)))?;

            if let (Some(username), Some(password)) = (&https_proxy.username, &https_proxy.password)
            {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create reqwest client: {}", e)))?;

        Ok(Self { client })
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Transport for ReqwestTransport {
    fn open(&self, url: &Url, method: &Method) -> Result<Box<dyn Connection>> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime available: {}", e)))?;

        tracing::debug!(%url, %method, "opening connection");

        Ok(Box::new(ReqwestConnection {
            client: self.client.clone(),
            handle,
            url: url.clone(),
            method: method.clone(),
            headers: HeaderMap::new(),
            state: State::Idle,
        }))
    }
}

enum State {
    Idle,
    Streaming {
        writer: ChannelWriter,
        response: JoinHandle<reqwest::Result<reqwest::Response>>,
    },
    Responded(reqwest::Response),
    Done,
}

struct ReqwestConnection {
    client: reqwest::Client,
    handle: Handle,
    url: Url,
    method: Method,
    headers: HeaderMap,
    state: State,
}

impl ReqwestConnection {
    fn start(&mut self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });

        let request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .body(reqwest::Body::wrap_stream(stream));

        let response = self.handle.spawn(request.send());
        self.state = State::Streaming {
            writer: ChannelWriter::new(tx, STREAM_CHUNK_SIZE),
            response,
        };
    }
}

impl Connection for ReqwestConnection {
    fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::Internal(
                "headers cannot change once the body has started".to_string(),
            ));
        }

        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    fn body(&mut self) -> Result<&mut dyn Write> {
        if matches!(self.state, State::Idle) {
            self.start();
        }

        match &mut self.state {
            State::Streaming { writer, .. } => Ok(writer as &mut dyn Write),
            _ => Err(Error::Internal("request body already closed".to_string())),
        }
    }

    fn finish(&mut self) -> Result<ResponseHead> {
        if matches!(self.state, State::Idle) {
            self.start();
        }

        let (mut writer, response) = match std::mem::replace(&mut self.state, State::Done) {
            State::Streaming { writer, response } => (writer, response),
            _ => return Err(Error::Internal("request already finished".to_string())),
        };

        // A failed flush usually means the request itself failed; prefer
        // that error when there is one.
        let flushed = writer.close();
        let response = self
            .handle
            .block_on(response)
            .map_err(|e| Error::Internal(format!("Request task failed: {}", e)))??;
        flushed?;

        // hyper keeps the status line's phrase only when it is not canonical
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok());
        let head = ResponseHead::with_reason(response.status(), reason);
        tracing::debug!(status = head.status.as_u16(), "response received");
        self.state = State::Responded(response);
        Ok(head)
    }

    fn read_body(&mut self) -> Result<String> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Responded(response) => Ok(self.handle.block_on(response.text())?),
            _ => Err(Error::Internal("no response to read".to_string())),
        }
    }
}

impl Drop for ReqwestConnection {
    fn drop(&mut self) {
        if let State::Streaming { writer, response } = &mut self.state {
            tracing::warn!(url = %self.url, "aborting unfinished upload");
            writer.abort();
            response.abort();
        }
    }
}
