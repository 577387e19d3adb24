//! Resize and re-encode an image part into a byte sink.

use super::calculations::{check_output_size, encoding_for, output_dimensions};
use super::codec::ImageCodec;
use crate::request::{CompressSpec, TargetSize};
use crate::Result;
use std::io::Write;
use std::path::Path;

/// Drives an [`ImageCodec`] through identify → decode → encode.
pub struct ImageTranscoder<'a> {
    codec: &'a dyn ImageCodec,
}

impl<'a> ImageTranscoder<'a> {
    pub fn new(codec: &'a dyn ImageCodec) -> Self {
        Self { codec }
    }

    /// Transcode the image at `path` into `sink`.
    ///
    /// Only the header is read to learn the intrinsic size; pixels are then
    /// decoded once at the scale-to-cover output size and encoded straight
    /// into `sink`.
    pub fn transcode(
        &self,
        path: &Path,
        target: Option<TargetSize>,
        compress: Option<CompressSpec>,
        sink: &mut dyn Write,
    ) -> Result<()> {
        let intrinsic = self.codec.identify(path)?;
        let output = output_dimensions(intrinsic, target);
        let encoding = encoding_for(compress);

        tracing::debug!(
            path = %path.display(),
            intrinsic_width = intrinsic.width,
            intrinsic_height = intrinsic.height,
            output_width = output.width,
            output_height = output.height,
            ?encoding,
            "transcoding image part"
        );

        check_output_size(output)?;

        let image = self.codec.decode(path, output)?;
        self.codec.encode(image, encoding, sink)
    }
}
