//! Image transcoding for file parts.
//!
//! A part with a target size or compress settings is not copied byte for
//! byte. Instead its image is measured, decoded at a scale-to-cover size and
//! re-encoded as JPEG or PNG directly into the request body.
//!
//! - [`calculations`]: sizing math and encoder choice
//! - [`codec`]: the [`ImageCodec`] seam
//! - [`rust_codec`]: production codec on the `image` crate
//! - [`transcoder`]: [`ImageTranscoder`], which ties the three together

pub mod calculations;
pub mod codec;
pub mod rust_codec;
pub mod transcoder;

pub use calculations::{
    DEFAULT_JPEG_QUALITY, Encoding, MAX_OUTPUT_PIXELS, check_output_size, cover_scale, encoding_for,
    output_dimensions, quality_percent,
};
pub use codec::{Dimensions, ImageCodec};
pub use rust_codec::RustCodec;
pub use transcoder::ImageTranscoder;
