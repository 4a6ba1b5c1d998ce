//! Error types for rasterpage.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rasterpage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds reported by sessions, handlers and the render pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The path given to `open_path` does not exist.
    #[error("No such file: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The decoding context could not be created.
    #[error("Cannot create context: {0}")]
    ContextCreation(String),

    /// No registered handler could parse the document.
    #[error("Cannot open document: {0}")]
    DocumentOpen(String),

    /// The in-memory stream over the input bytes could not be created.
    #[error("Cannot open memory stream: {0}")]
    StreamOpen(String),

    /// The document is encrypted and requires a password.
    ///
    /// Returned by [`Session::check_password`](crate::Session::check_password)
    /// and by `render_page` on such documents; opening still succeeds.
    #[error("Document needs password")]
    NeedsPassword,

    /// Page index is outside `0..page_count`.
    #[error("Page {index} is out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { index: usize, page_count: usize },

    /// The pixel buffer could not be allocated.
    #[error("Cannot create {width}x{height} pixmap")]
    PixmapCreation { width: i64, height: i64 },

    /// The pixel buffer samples could not be read back.
    #[error("Cannot read pixmap samples")]
    PixelRead,

    /// Page content failed while running through a device.
    #[error("Rendering error: {0}")]
    Render(String),

    /// Document or page information could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O error, surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::DocumentOpen(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NeedsPassword;
        assert_eq!(err.to_string(), "Document needs password");

        let err = Error::PageIndexOutOfRange {
            index: 10,
            page_count: 5,
        };
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );

        let err = Error::PixmapCreation {
            width: 0,
            height: 3300,
        };
        assert_eq!(err.to_string(), "Cannot create 0x3300 pixmap");
    }

    #[test]
    fn test_file_not_found_display() {
        let err = Error::FileNotFound(PathBuf::from("/tmp/missing.pdf"));
        assert_eq!(err.to_string(), "No such file: /tmp/missing.pdf");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "reader closed");
        let err: Error = io_err.into();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<crate::DocumentInfo>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialize(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }
}
