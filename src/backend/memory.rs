//! In-memory transport
//!
//! Captures every request (method, URL, headers, body bytes) instead of
//! sending it, and answers with a scripted outcome. Useful for testing code
//! that builds uploads without standing up a server.

use super::{Connection, ResponseHead, Transport};
use crate::{Error, Result};
use http::{Method, StatusCode};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use url::Url;

/// How a [`MemoryTransport`] connection behaves
#[derive(Clone, Debug)]
pub enum Script {
    /// Accept the body and answer with this status and body
    Respond {
        /// Status code to report
        status: StatusCode,
        /// Reason phrase to report instead of the canonical one
        reason: Option<String>,
        /// Response body text
        body: String,
    },
    /// Fail to open the connection
    FailOpen(String),
    /// Accept this many body bytes, then fail every write
    FailWriteAfter(usize),
    /// Accept the body, then fail while waiting for the response
    FailFinish(String),
}

/// A request as seen by the transport
#[derive(Clone, Debug, Default)]
pub struct CapturedRequest {
    /// Method
    pub method: String,
    /// URL
    pub url: String,
    /// Headers in the order they were set, last value wins per name
    pub headers: Vec<(String, String)>,
    /// Body bytes written before the request finished or was dropped
    pub body: Vec<u8>,
    /// Whether `finish` completed
    pub finished: bool,
    /// Whether the response body was read
    pub body_read: bool,
}

impl CapturedRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that records requests in memory
#[derive(Clone)]
pub struct MemoryTransport {
    script: Script,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MemoryTransport {
    /// Transport that answers every request with `status` and `body`
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::scripted(Script::Respond {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            reason: None,
            body: body.into(),
        })
    }

    /// Like [`respond`](Self::respond) with a custom reason phrase
    pub fn respond_with_reason(
        status: u16,
        reason: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::scripted(Script::Respond {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            reason: Some(reason.into()),
            body: body.into(),
        })
    }

    /// Transport following an explicit script
    pub fn scripted(script: Script) -> Self {
        Self {
            script,
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .map(|captured| captured.clone())
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, url: &Url, method: &Method) -> Result<Box<dyn Connection>> {
        if let Script::FailOpen(message) = &self.script {
            return Err(Error::Connection(message.clone()));
        }

        let index = {
            let mut captured = self
                .captured
                .lock()
                .map_err(|_| Error::Internal("capture lock poisoned".to_string()))?;
            captured.push(CapturedRequest {
                method: method.to_string(),
                url: url.to_string(),
                ..CapturedRequest::default()
            });
            captured.len() - 1
        };

        Ok(Box::new(MemoryConnection {
            script: self.script.clone(),
            sink: CaptureSink {
                captured: self.captured.clone(),
                index,
                limit: match self.script {
                    Script::FailWriteAfter(limit) => Some(limit),
                    _ => None,
                },
                written: 0,
            },
            finished: false,
        }))
    }
}

struct CaptureSink {
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    index: usize,
    limit: Option<usize>,
    written: usize,
}

impl CaptureSink {
    fn with_request<T>(&self, f: impl FnOnce(&mut CapturedRequest) -> T) -> io::Result<T> {
        let mut captured = self
            .captured
            .lock()
            .map_err(|_| io::Error::other("capture lock poisoned"))?;
        captured
            .get_mut(self.index)
            .map(f)
            .ok_or_else(|| io::Error::other("request vanished"))
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let allowed = match self.limit {
            Some(limit) => limit.saturating_sub(self.written).min(buf.len()),
            None => buf.len(),
        };
        if allowed == 0 && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"));
        }
        self.with_request(|request| request.body.extend_from_slice(&buf[..allowed]))?;
        self.written += allowed;
        Ok(allowed)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemoryConnection {
    script: Script,
    sink: CaptureSink,
    finished: bool,
}

impl Connection for MemoryConnection {
    fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.sink.with_request(|request| {
            request.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            request.headers.push((name.to_string(), value.to_string()));
        })?;
        Ok(())
    }

    fn body(&mut self) -> Result<&mut dyn Write> {
        if self.finished {
            return Err(Error::Internal("request body already closed".to_string()));
        }
        Ok(&mut self.sink as &mut dyn Write)
    }

    fn finish(&mut self) -> Result<ResponseHead> {
        if self.finished {
            return Err(Error::Internal("request already finished".to_string()));
        }
        self.finished = true;
        self.sink.with_request(|request| request.finished = true)?;

        match &self.script {
            Script::Respond { status, reason, .. } => {
                Ok(ResponseHead::with_reason(*status, reason.as_deref()))
            }
            Script::FailFinish(message) => Err(Error::Connection(message.clone())),
            Script::FailOpen(message) => Err(Error::Connection(message.clone())),
            Script::FailWriteAfter(_) => Ok(ResponseHead::new(StatusCode::OK)),
        }
    }

    fn read_body(&mut self) -> Result<String> {
        if !self.finished {
            return Err(Error::Internal("no response to read".to_string()));
        }
        self.sink.with_request(|request| request.body_read = true)?;
        match &self.script {
            Script::Respond { body, .. } => Ok(body.clone()),
            _ => Ok(String::new()),
        }
    }
}
