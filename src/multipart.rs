//! Streaming multipart/form-data encoder
//!
//! The body is written straight into the connection's sink as it is
//! produced. Fields go first, in order, then file parts, then the closing
//! delimiter:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<field>"\r\n
//! \r\n
//! <value>\r\n
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<name>"; filename="<filename>"\r\n
//! \r\n
//! <file bytes>\r\n
//! --<boundary>--\r\n
//! ```
//!
//! Values and filenames are written verbatim. There is no escaping and no
//! per-part `Content-Type` line.

use crate::imaging::{ImageCodec, ImageTranscoder};
use crate::request::{FieldEntry, FilePart};
use crate::resolver::PathResolver;
use crate::Result;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Upper bound on the buffer used to copy a raw file part
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Fixed prefix of every boundary token
pub const BOUNDARY_PREFIX: &str = "----frakt";
const BOUNDARY_RANDOM_LEN: usize = 32;
const CRLF: &[u8] = b"\r\n";

/// Generate a fresh boundary token.
///
/// 32 alphanumeric characters give about 190 bits of randomness, so a
/// collision with body content or another request is not a practical
/// concern and content is never scanned for it.
pub fn generate_boundary() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", BOUNDARY_PREFIX, random)
}

/// `Content-Type` header value for a body framed with `boundary`
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Low-level framing over any [`Write`] sink
pub struct MultipartWriter<W: Write> {
    boundary: String,
    sink: W,
}

impl<W: Write> MultipartWriter<W> {
    /// Wrap `sink`, framing parts with `boundary`
    pub fn new(boundary: impl Into<String>, sink: W) -> Self {
        Self {
            boundary: boundary.into(),
            sink,
        }
    }

    /// The boundary token in use
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn delimiter(&mut self) -> std::io::Result<()> {
        write!(self.sink, "--{}", self.boundary)?;
        self.sink.write_all(CRLF)
    }

    /// Write one complete form field
    pub fn write_field(&mut self, name: &str, value: &str) -> std::io::Result<()> {
        self.delimiter()?;
        write!(
            self.sink,
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            name
        )?;
        self.sink.write_all(value.as_bytes())?;
        self.sink.write_all(CRLF)
    }

    /// Write the headers of a file part; content follows via
    /// [`body`](Self::body) and is closed by [`end_part`](Self::end_part)
    pub fn begin_file(&mut self, name: &str, filename: &str) -> std::io::Result<()> {
        self.delimiter()?;
        write!(
            self.sink,
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
            name, filename
        )
    }

    /// Sink for the current part's content
    pub fn body(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Terminate the current file part
    pub fn end_part(&mut self) -> std::io::Result<()> {
        self.sink.write_all(CRLF)
    }

    /// Write the closing delimiter and hand the sink back
    pub fn finish(mut self) -> std::io::Result<W> {
        write!(self.sink, "--{}--", self.boundary)?;
        self.sink.write_all(CRLF)?;
        Ok(self.sink)
    }
}

/// Serializes fields and file parts into a sink
///
/// File parts are resolved through the [`PathResolver`] just before they are
/// opened. Parts without size or compress settings are copied in chunks of at
/// most `chunk_size` bytes; the rest go through the [`ImageTranscoder`].
///
/// The first error aborts the encode. Nothing further is written, not even
/// the closing delimiter, so a failed transcode never produces a body that
/// looks complete.
pub struct MultipartEncoder<'a> {
    boundary: &'a str,
    resolver: &'a dyn PathResolver,
    codec: &'a dyn ImageCodec,
    chunk_size: usize,
}

impl<'a> MultipartEncoder<'a> {
    /// Create an encoder with the default chunk size
    pub fn new(
        boundary: &'a str,
        resolver: &'a dyn PathResolver,
        codec: &'a dyn ImageCodec,
    ) -> Self {
        Self {
            boundary,
            resolver,
            codec,
            chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Override the raw copy chunk size (at least one byte)
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Write the whole body into `sink`
    pub fn encode<W: Write>(
        &self,
        sink: W,
        fields: &[FieldEntry],
        files: &[FilePart],
    ) -> Result<W> {
        let mut writer = MultipartWriter::new(self.boundary, sink);

        for field in fields {
            writer.write_field(&field.name, &field.value)?;
            tracing::debug!(field = %field.name, bytes = field.value.len(), "wrote field");
        }

        for part in files {
            self.encode_file(&mut writer, part)?;
        }

        Ok(writer.finish()?)
    }

    fn encode_file<W: Write>(&self, writer: &mut MultipartWriter<W>, part: &FilePart) -> Result<()> {
        let path = self.resolver.resolve(&part.source)?;
        writer.begin_file(&part.name, &part.filename)?;

        if part.needs_transcode() {
            ImageTranscoder::new(self.codec).transcode(
                &path,
                part.size,
                part.compress,
                writer.body(),
            )?;
            tracing::debug!(name = %part.name, filename = %part.filename, "wrote transcoded part");
        } else {
            let copied = copy_chunked(&path, writer.body(), self.chunk_size)?;
            tracing::debug!(
                name = %part.name,
                filename = %part.filename,
                bytes = copied,
                "wrote file part"
            );
        }

        writer.end_part()?;
        Ok(())
    }
}

/// Copy the file at `path` into `sink` through a buffer of at most
/// `chunk_size` bytes, returning the number of bytes copied.
pub fn copy_chunked(path: &Path, sink: &mut dyn Write, chunk_size: usize) -> Result<u64> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let capacity = match usize::try_from(len) {
        Ok(0) | Err(_) => chunk_size,
        Ok(len) => len.min(chunk_size),
    }
    .max(1);

    let mut buffer = vec![0u8; capacity];
    let mut total = 0u64;
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        sink.write_all(&buffer[..read])?;
        total += read as u64;
    }
    Ok(total)
}
