//! Image codec trait and shared types.
//!
//! The [`ImageCodec`] trait is the seam between the transcoder, which decides
//! *what* to produce, and the pixel work. The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec); tests substitute a recording
//! fake.

use super::calculations::Encoding;
use crate::Result;
use image::DynamicImage;
use std::io::Write;
use std::path::Path;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decode and encode capability used by the transcoder.
pub trait ImageCodec: Send + Sync {
    /// Read the intrinsic dimensions without decoding pixels.
    fn identify(&self, path: &Path) -> Result<Dimensions>;

    /// Decode the full image at exactly `size`.
    fn decode(&self, path: &Path, size: Dimensions) -> Result<DynamicImage>;

    /// Encode `image` into `sink`. The image is consumed so its pixel buffer
    /// is freed as soon as encoding returns.
    fn encode(&self, image: DynamicImage, encoding: Encoding, sink: &mut dyn Write) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    /// Codec that records calls and emits a short marker instead of pixels.
    #[derive(Default)]
    pub struct RecordingCodec {
        pub dimensions: Option<Dimensions>,
        pub fail_encode: bool,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Decode { path: String, size: Dimensions },
        Encode(Encoding),
    }

    impl RecordingCodec {
        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions { width, height }),
                ..Self::default()
            }
        }

        pub fn failing_encode(mut self) -> Self {
            self.fail_encode = true;
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageCodec for RecordingCodec {
        fn identify(&self, path: &Path) -> Result<Dimensions> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));
            self.dimensions
                .ok_or_else(|| Error::Decode("no mock dimensions".to_string()))
        }

        fn decode(&self, path: &Path, size: Dimensions) -> Result<DynamicImage> {
            self.operations.lock().unwrap().push(RecordedOp::Decode {
                path: path.to_string_lossy().to_string(),
                size,
            });
            Ok(DynamicImage::new_rgb8(1, 1))
        }

        fn encode(
            &self,
            _image: DynamicImage,
            encoding: Encoding,
            sink: &mut dyn Write,
        ) -> Result<()> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Encode(encoding));
            if self.fail_encode {
                return Err(Error::Encode("mock encoder refused".to_string()));
            }
            let marker = match encoding {
                Encoding::Jpeg { quality } => format!("<jpeg q={}>", quality),
                Encoding::Png => "<png>".to_string(),
            };
            sink.write_all(marker.as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_identify() {
        let codec = RecordingCodec::with_dimensions(800, 600);
        let dims = codec.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(dims, Dimensions { width: 800, height: 600 });
        assert_eq!(
            codec.get_operations(),
            vec![RecordedOp::Identify("/test/image.jpg".to_string())]
        );
    }

    #[test]
    fn mock_without_dimensions_fails_identify() {
        let codec = RecordingCodec::default();
        assert!(matches!(
            codec.identify(Path::new("/x.jpg")),
            Err(Error::Decode(_))
        ));
    }
}
