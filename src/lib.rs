//! Streaming multipart/form-data uploads with on-the-fly image transcoding
//!
//! An upload is a list of text fields plus a list of files. Files are read
//! from disk in bounded chunks, or, when a part asks for a target size or
//! compression, decoded, scaled to cover the box and re-encoded as JPEG or
//! PNG straight into the request body. Each upload ends in exactly one
//! [`UploadResult`].
//!
//! ```rust,no_run
//! use frakt_upload::{CompressSpec, FilePart, TargetSize, UploadRequest, Uploader};
//!
//! # #[tokio::main]
//! # async fn main() -> frakt_upload::Result<()> {
//! let uploader = Uploader::new()?;
//! let request = UploadRequest::builder("https://example.com/upload")
//!     .header("Authorization", "Bearer token")
//!     .field("caption", "sunset")
//!     .file(
//!         FilePart::new("/sdcard/DCIM/sunset.jpg")
//!             .name("photo")
//!             .filename("sunset.jpg")
//!             .size(TargetSize::new(1024.0, 768.0)?)
//!             .compress(CompressSpec::jpeg(0.8)),
//!     );
//!
//! uploader.upload_with_callback(request, |result| println!("{result:?}"));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use backend::{ProxyConfig, ReqwestTransport, TransportConfig};
pub use error::{Error, Result};
pub use options::{FileDescriptor, SizeDescriptor, UploadOptions};
pub use request::{
    CompressSpec, DEFAULT_FIELD_NAME, DEFAULT_FILENAME, DEFAULT_METHOD, FieldEntry, FilePart,
    OutputFormat, TargetSize, UploadRequest, UploadRequestBuilder,
};
pub use resolver::{FsResolver, MediaIndex, PathResolver, StaticMediaIndex};
pub use uploader::{UploadResult, Uploader, UploaderBuilder};

pub mod backend;
pub mod imaging;
pub mod multipart;
pub mod options;
pub mod resolver;

mod error;
mod request;
mod uploader;
