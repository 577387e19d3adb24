//! Error types for the upload pipeline

use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for upload operations
///
/// The variants exist for logging and tests. Callers only ever see the
/// collapsed message carried by [`UploadResult::Failure`](crate::UploadResult).
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// A caller header could not be represented on the wire
    #[error("Invalid header {name}: {message}")]
    InvalidHeader {
        /// Header name as supplied
        name: String,
        /// Why it was rejected
        message: String,
    },

    /// The options map is missing a required key or has the wrong shape
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Connection could not be opened or the transport failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O error on a source file or the request body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source reference could not be turned into a readable path
    #[error("Could not resolve {reference}: {message}")]
    Resolution {
        /// The opaque reference as given by the caller
        reference: String,
        /// Why resolution failed
        message: String,
    },

    /// Image header or pixel decode failure
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Image re-encode failure
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The server answered with something other than 200
    #[error("{reason}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Status reason phrase
        reason: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message handed to the completion callback.
    pub fn failure_message(&self) -> String {
        format!("Error happened: {}", self)
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::InvalidUrl(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Error::InvalidUrl(error.to_string())
        } else {
            Error::Connection(error.to_string())
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::IoError(e) => Error::Io(e),
            image::ImageError::Encoding(e) => Error::Encode(e.to_string()),
            other => Error::Decode(other.to_string()),
        }
    }
}
