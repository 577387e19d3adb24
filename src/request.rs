//! Upload request types and builders

use crate::{Error, Result};
use http::Method;
use std::collections::HashMap;
use url::Url;

/// Form field name used when a file part does not name one
pub const DEFAULT_FIELD_NAME: &str = "name";

/// Filename sent when a file part does not name one
pub const DEFAULT_FILENAME: &str = "filename";

/// HTTP method used when the caller does not pick one
pub const DEFAULT_METHOD: Method = Method::POST;

/// A plain form field, serialized before any file part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    /// Field name
    pub name: String,
    /// Field value, written verbatim
    pub value: String,
}

impl FieldEntry {
    /// Create a field
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Bounding box an image is scaled to cover
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSize {
    /// Requested width
    pub width: f64,
    /// Requested height
    pub height: f64,
}

impl TargetSize {
    /// Create a target size. Both dimensions must be positive and finite.
    pub fn new(width: f64, height: f64) -> Result<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(Error::InvalidOptions(format!(
                "size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

/// Output format for a transcoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Lossy JPEG at the part's quality
    #[default]
    Jpeg,
    /// Lossless PNG; quality is ignored
    Png,
}

/// Re-encode settings for an image part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressSpec {
    /// Output format
    pub format: OutputFormat,
    /// JPEG quality in `0.0..=1.0`
    pub quality: f64,
}

impl CompressSpec {
    /// JPEG at the given quality, clamped into `0.0..=1.0`
    pub fn jpeg(quality: f64) -> Self {
        let quality = if quality.is_nan() {
            1.0
        } else {
            quality.clamp(0.0, 1.0)
        };
        Self {
            format: OutputFormat::Jpeg,
            quality,
        }
    }

    /// Lossless PNG
    pub fn png() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 1.0,
        }
    }
}

impl Default for CompressSpec {
    fn default() -> Self {
        Self::jpeg(1.0)
    }
}

/// A file to send as one multipart part
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Form field name
    pub name: String,
    /// Filename reported to the server
    pub filename: String,
    /// Opaque source reference: a path, a `file:` URI or a `content:` URI
    pub source: String,
    /// Scale-to-cover bounding box
    pub size: Option<TargetSize>,
    /// Re-encode settings
    pub compress: Option<CompressSpec>,
}

impl FilePart {
    /// Create a file part with the default field name and filename
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_FIELD_NAME.to_string(),
            filename: DEFAULT_FILENAME.to_string(),
            source: source.into(),
            size: None,
            compress: None,
        }
    }

    /// Set the form field name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the filename sent to the server
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Scale the image to cover the given box
    pub fn size(mut self, size: TargetSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Re-encode the image with the given settings
    pub fn compress(mut self, compress: CompressSpec) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Whether the part goes through the image transcoder instead of a raw copy
    pub fn needs_transcode(&self) -> bool {
        self.size.is_some() || self.compress.is_some()
    }
}

/// A complete upload, consumed once by [`Uploader`](crate::Uploader)
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub(crate) url: Url,
    pub(crate) method: Method,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) files: Vec<FilePart>,
}

impl UploadRequest {
    /// Start building a request for the given URL
    pub fn builder(url: impl Into<String>) -> UploadRequestBuilder {
        UploadRequestBuilder::new(url.into())
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Caller-supplied headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Form fields in serialization order
    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    /// File parts in serialization order
    pub fn files(&self) -> &[FilePart] {
        &self.files
    }
}

/// Builder for [`UploadRequest`]
///
/// Nothing is validated until [`build`](Self::build), and the uploader calls
/// `build` on its worker thread, so a bad URL or method surfaces as a
/// failure outcome rather than an error at the call site.
///
/// # Examples
///
/// ```rust
/// use frakt_upload::{FilePart, TargetSize, UploadRequest};
///
/// # fn main() -> frakt_upload::Result<()> {
/// let request = UploadRequest::builder("https://example.com/upload")
///     .header("Authorization", "Bearer token")
///     .field("album", "holiday")
///     .file(
///         FilePart::new("/sdcard/DCIM/photo.jpg")
///             .name("photo")
///             .filename("photo.jpg")
///             .size(TargetSize::new(800.0, 600.0)?),
///     )
///     .build()?;
/// assert_eq!(request.method(), "POST");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UploadRequestBuilder {
    url: String,
    method: Option<String>,
    headers: HashMap<String, String>,
    fields: Vec<FieldEntry>,
    files: Vec<FilePart>,
}

impl UploadRequestBuilder {
    pub(crate) fn new(url: String) -> Self {
        Self {
            url,
            method: None,
            headers: HashMap::new(),
            fields: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Set the HTTP method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header. Later values for the same name win.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a form field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FieldEntry::new(name, value));
        self
    }

    /// Append a file part
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Validate the URL and method and produce the request
    pub fn build(self) -> Result<UploadRequest> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let method = match self.method {
            Some(method) => Method::from_bytes(method.as_bytes())
                .map_err(|_| Error::InvalidMethod(method.clone()))?,
            None => DEFAULT_METHOD,
        };

        Ok(UploadRequest {
            url,
            method,
            headers: self.headers,
            fields: self.fields,
            files: self.files,
        })
    }
}
