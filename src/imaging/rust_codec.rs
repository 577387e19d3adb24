//! Image codec built on the `image` crate.
//!
//! | Operation | Implementation |
//! |---|---|
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Decode | `ImageReader::decode`, then `resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `codecs::jpeg::JpegEncoder` at the requested quality |
//! | Encode → PNG | `codecs::png::PngEncoder` |
//!
//! The `image` decoders cannot decode straight to a smaller size, so the
//! full-resolution buffer is resized and dropped inside [`RustCodec::decode`];
//! only one decoded buffer is alive once it returns.

use super::calculations::{Encoding, check_output_size};
use super::codec::{Dimensions, ImageCodec};
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Limits};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Pure Rust codec using the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Longest side accepted from a source image header
const MAX_SOURCE_SIDE: u32 = 32 * 1024;

/// Decoder allocation ceiling in bytes
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

fn open(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>> {
    let mut reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(Error::Io)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_SIDE);
    limits.max_image_height = Some(MAX_SOURCE_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);
    Ok(reader)
}

impl ImageCodec for RustCodec {
    fn identify(&self, path: &Path) -> Result<Dimensions> {
        let (width, height) = open(path)?.into_dimensions().map_err(|e| {
            Error::Decode(format!("{}: {}", path.display(), e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, path: &Path, size: Dimensions) -> Result<DynamicImage> {
        check_output_size(size)?;
        let image = open(path)?
            .decode()
            .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;

        if image.width() == size.width && image.height() == size.height {
            return Ok(image);
        }
        Ok(image.resize_exact(size.width, size.height, FilterType::Lanczos3))
    }

    fn encode(&self, image: DynamicImage, encoding: Encoding, sink: &mut dyn Write) -> Result<()> {
        let mut writer = BufWriter::new(sink);
        match encoding {
            Encoding::Jpeg { quality } => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.into_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)
                    .map_err(|e| Error::Encode(e.to_string()))?;
            }
            Encoding::Png => {
                image
                    .write_with_encoder(PngEncoder::new(&mut writer))
                    .map_err(|e| Error::Encode(e.to_string()))?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
