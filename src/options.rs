//! Host invocation contract
//!
//! Hosts call `upload(options, callback)` with a loosely typed map. This
//! module turns that map into an [`UploadRequestBuilder`] and turns an
//! [`UploadResult`] back into the `(error, response)` pair the host callback
//! expects.

use crate::request::{
    CompressSpec, DEFAULT_FIELD_NAME, DEFAULT_FILENAME, FilePart, TargetSize, UploadRequest,
    UploadRequestBuilder,
};
use crate::uploader::UploadResult;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Options map as sent by the host
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    /// Destination URL
    pub upload_url: String,
    /// HTTP method, `POST` when absent
    #[serde(default)]
    pub method: Option<String>,
    /// Request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// File parts in body order
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    /// Form fields, in the order the host listed them
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// One entry of the `files` list
#[derive(Debug, Clone, Deserialize)]
pub struct FileDescriptor {
    /// Path or URI of the source file
    pub filepath: String,
    /// Form field name
    #[serde(default)]
    pub name: Option<String>,
    /// Filename announced to the server
    #[serde(default)]
    pub filename: Option<String>,
    /// Resize target
    #[serde(default)]
    pub size: Option<SizeDescriptor>,
    /// JPEG quality in `[0, 1]`
    #[serde(default)]
    pub compress: Option<f64>,
    /// Re-encode as PNG instead of JPEG
    #[serde(default)]
    pub png: bool,
}

/// `size` entry of a file descriptor
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SizeDescriptor {
    /// Target width
    pub width: f64,
    /// Target height
    pub height: f64,
}

impl UploadOptions {
    /// Parse the host's options map
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    /// Parse options from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    /// Convert into a request builder.
    ///
    /// Field values must be strings. URL and method are checked later by
    /// [`UploadRequestBuilder::build`].
    pub fn into_request(self) -> Result<UploadRequestBuilder> {
        let mut builder = UploadRequest::builder(self.upload_url);

        if let Some(method) = self.method {
            builder = builder.method(method);
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        for (name, value) in self.fields {
            match value {
                Value::String(value) => builder = builder.field(name, value),
                other => {
                    return Err(Error::InvalidOptions(format!(
                        "field {name} must be a string, got {other}"
                    )));
                }
            }
        }

        for file in self.files {
            builder = builder.file(file.into_part()?);
        }

        Ok(builder)
    }
}

impl FileDescriptor {
    /// Convert into a [`FilePart`].
    ///
    /// `png` only picks the output format. A descriptor with neither `size`
    /// nor `compress` is sent as-is even when `png` is set.
    pub fn into_part(self) -> Result<FilePart> {
        let mut part = FilePart::new(self.filepath)
            .name(self.name.unwrap_or_else(|| DEFAULT_FIELD_NAME.to_string()))
            .filename(self.filename.unwrap_or_else(|| DEFAULT_FILENAME.to_string()));

        let resize = self.size.is_some();
        if let Some(size) = self.size {
            part = part.size(TargetSize::new(size.width, size.height)?);
        }

        let compress = match (self.compress, self.png) {
            (Some(_), true) => Some(CompressSpec::png()),
            (None, true) if resize => Some(CompressSpec::png()),
            (Some(quality), false) => Some(CompressSpec::jpeg(quality)),
            _ => None,
        };
        if let Some(compress) = compress {
            part = part.compress(compress);
        }

        Ok(part)
    }
}

impl UploadResult {
    /// Split into the host callback's `(error message, response)` pair.
    ///
    /// Exactly one side is `Some`. The response is `{"data": body, "status": code}`.
    pub fn into_callback_args(self) -> (Option<String>, Option<Value>) {
        match self {
            UploadResult::Success { status, body } => {
                (None, Some(json!({ "data": body, "status": status })))
            }
            UploadResult::Failure { message } => (Some(message), None),
        }
    }
}
