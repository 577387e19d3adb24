//! Resolution of opaque source references to readable paths
//!
//! Callers hand the uploader whatever their platform gives them: a plain
//! filesystem path, a `file:` URI, or a `content:` URI mediated by a media
//! index. Everything downstream works on [`PathBuf`]s, so resolution
//! happens once per part right before the file is opened.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Turns a source reference into a filesystem path
pub trait PathResolver: Send + Sync {
    /// Resolve `reference` to a path the file reader can open.
    fn resolve(&self, reference: &str) -> Result<PathBuf>;
}

/// Platform media index that knows where content-provider entries live
pub trait MediaIndex: Send + Sync {
    /// Look up the storage path backing a `content:` URI.
    ///
    /// `None` means the index has no row for the URI.
    fn data_path(&self, uri: &Url) -> Option<String>;
}

/// Default resolver
///
/// `content:` URIs are looked up in the configured [`MediaIndex`], `file:`
/// URIs contribute their path component, and anything else is taken to be
/// a path already.
#[derive(Default)]
pub struct FsResolver {
    media_index: Option<Box<dyn MediaIndex>>,
}

impl FsResolver {
    /// Resolver without a media index; `content:` URIs fail to resolve
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that answers `content:` URIs from `index`
    pub fn with_media_index(index: impl MediaIndex + 'static) -> Self {
        Self {
            media_index: Some(Box::new(index)),
        }
    }

    fn resolve_content(&self, reference: &str, uri: &Url) -> Result<PathBuf> {
        let index = self.media_index.as_ref().ok_or_else(|| Error::Resolution {
            reference: reference.to_string(),
            message: "no media index configured".to_string(),
        })?;

        match index.data_path(uri) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(Error::Resolution {
                reference: reference.to_string(),
                message: "media index has no data path".to_string(),
            }),
        }
    }
}

impl PathResolver for FsResolver {
    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if reference.is_empty() {
            return Err(Error::Resolution {
                reference: String::new(),
                message: "empty reference".to_string(),
            });
        }

        // Windows drive letters parse as one-letter schemes
        let uri = match Url::parse(reference) {
            Ok(uri) if uri.scheme().len() > 1 => uri,
            _ => return Ok(PathBuf::from(reference)),
        };

        match uri.scheme() {
            "content" => self.resolve_content(reference, &uri),
            "file" => file_uri_path(&uri).ok_or_else(|| Error::Resolution {
                reference: reference.to_string(),
                message: "file URI has no usable path".to_string(),
            }),
            _ => Ok(PathBuf::from(reference)),
        }
    }
}

fn file_uri_path(uri: &Url) -> Option<PathBuf> {
    if let Ok(path) = uri.to_file_path() {
        return Some(path);
    }
    // Hosts like `file://sdcard/x` are not valid local file URLs; keep the
    // decoded path component.
    let path = urlencoding::decode(uri.path()).ok()?;
    (!path.is_empty()).then(|| PathBuf::from(path.into_owned()))
}

/// In-memory media index, mostly useful for tests and embedders that keep
/// their own mapping
#[derive(Debug, Default, Clone)]
pub struct StaticMediaIndex {
    entries: HashMap<String, String>,
}

impl StaticMediaIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a `content:` URI to a storage path
    pub fn insert(&mut self, uri: impl Into<String>, path: impl Into<String>) {
        self.entries.insert(uri.into(), path.into());
    }
}

impl MediaIndex for StaticMediaIndex {
    fn data_path(&self, uri: &Url) -> Option<String> {
        self.entries.get(uri.as_str()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> StaticMediaIndex {
        let mut index = StaticMediaIndex::new();
        index.insert(
            "content://media/external/images/media/42",
            "/storage/emulated/0/DCIM/42.jpg",
        );
        index
    }

    #[test]
    fn plain_paths_pass_through() {
        let resolver = FsResolver::new();
        assert_eq!(
            resolver.resolve("/tmp/photo.jpg").unwrap(),
            PathBuf::from("/tmp/photo.jpg")
        );
        assert_eq!(
            resolver.resolve("relative/photo.jpg").unwrap(),
            PathBuf::from("relative/photo.jpg")
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_uri_uses_path_component() {
        let resolver = FsResolver::new();
        assert_eq!(
            resolver.resolve("file:///tmp/my%20photo.jpg").unwrap(),
            PathBuf::from("/tmp/my photo.jpg")
        );
    }

    #[test]
    fn content_uri_is_looked_up() {
        let resolver = FsResolver::with_media_index(index());
        assert_eq!(
            resolver
                .resolve("content://media/external/images/media/42")
                .unwrap(),
            PathBuf::from("/storage/emulated/0/DCIM/42.jpg")
        );
    }

    #[test]
    fn unknown_content_uri_fails() {
        let resolver = FsResolver::with_media_index(index());
        let err = resolver
            .resolve("content://media/external/images/media/7")
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn content_uri_without_index_fails() {
        let err = FsResolver::new()
            .resolve("content://media/external/images/media/42")
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn empty_reference_fails() {
        assert!(FsResolver::new().resolve("").is_err());
    }
}
