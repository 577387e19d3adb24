//! Pure calculation functions for transcoding parameters.
//!
//! Nothing here touches pixels or files.

use super::codec::Dimensions;
use crate::request::{CompressSpec, OutputFormat, TargetSize};
use crate::{Error, Result};

/// JPEG quality used when an image is resized without explicit settings.
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Scale factor that makes `intrinsic` cover `target`.
///
/// The larger of the two axis ratios wins, so the scaled image is at least
/// as large as the target box on both axes.
///
/// ```
/// # use frakt_upload::imaging::{Dimensions, cover_scale};
/// # use frakt_upload::TargetSize;
/// let scale = cover_scale(
///     Dimensions { width: 50, height: 50 },
///     TargetSize { width: 100.0, height: 200.0 },
/// );
/// assert_eq!(scale, 4.0);
/// ```
pub fn cover_scale(intrinsic: Dimensions, target: TargetSize) -> f64 {
    let sx = target.width / intrinsic.width as f64;
    let sy = target.height / intrinsic.height as f64;
    sx.max(sy)
}

/// Largest output the transcoder will decode into, in pixels.
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

/// Dimensions the image is decoded at before encoding.
///
/// Both axes are scaled by [`cover_scale`], so the intrinsic aspect ratio is
/// kept and a decoded image is never stretched; the target box only decides
/// how large the result must be. Without a target, or when either intrinsic
/// dimension is zero, the image keeps its intrinsic size.
///
/// The result is not bounded; pass it through [`check_output_size`] before
/// allocating.
pub fn output_dimensions(intrinsic: Dimensions, target: Option<TargetSize>) -> Dimensions {
    match target {
        Some(target) if intrinsic.width > 0 && intrinsic.height > 0 => {
            let scale = cover_scale(intrinsic, target);
            Dimensions {
                width: scale_axis(intrinsic.width, scale),
                height: scale_axis(intrinsic.height, scale),
            }
        }
        _ => intrinsic,
    }
}

fn scale_axis(value: u32, scale: f64) -> u32 {
    let scaled = (value as f64 * scale).round();
    scaled.clamp(1.0, u32::MAX as f64) as u32
}

/// Fail with [`Error::Decode`] when `size` would need more than
/// [`MAX_OUTPUT_PIXELS`] pixels.
pub fn check_output_size(size: Dimensions) -> Result<()> {
    match u64::from(size.width).checked_mul(u64::from(size.height)) {
        Some(pixels) if pixels <= MAX_OUTPUT_PIXELS => Ok(()),
        _ => Err(Error::Decode(format!(
            "output size {}x{} exceeds {} pixels",
            size.width, size.height, MAX_OUTPUT_PIXELS
        ))),
    }
}

/// Encoder selection for an image part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// JPEG with quality percent in `0..=100`.
    Jpeg {
        /// Quality percent
        quality: u8,
    },
    /// Lossless PNG.
    Png,
}

/// Pick the encoder for a part's compress settings.
///
/// PNG ignores quality. JPEG quality is `quality * 100` rounded to a whole
/// percent; with no settings at all the image is re-encoded as JPEG at 100.
pub fn encoding_for(compress: Option<CompressSpec>) -> Encoding {
    match compress {
        Some(CompressSpec {
            format: OutputFormat::Png,
            ..
        }) => Encoding::Png,
        Some(CompressSpec { quality, .. }) => Encoding::Jpeg {
            quality: quality_percent(quality),
        },
        None => Encoding::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        },
    }
}

/// Convert a `0.0..=1.0` quality into a percent in `0..=100`.
///
/// Encoders that cannot go below 1 clamp on their side.
pub fn quality_percent(quality: f64) -> u8 {
    if quality.is_nan() {
        return DEFAULT_JPEG_QUALITY;
    }
    (quality * 100.0).round().clamp(0.0, 100.0) as u8
}
