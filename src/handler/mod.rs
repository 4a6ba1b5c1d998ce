//! Document handler abstraction layer.
//!
//! A [`DocumentHandler`] turns a file or an in-memory stream into a
//! [`Document`]; a document yields [`Page`]s that run their decoded content
//! through a [`Device`]. Handlers are registered on the decoding context and
//! looked up by MIME type, file extension or content sniffing.
//!
//! # Example
//!
//! ```no_run
//! use rasterpage::{Context, Session, SessionOptions};
//! use rasterpage::handler::PdfHandler;
//! use std::sync::Arc;
//!
//! fn main() -> rasterpage::Result<()> {
//!     let mut ctx = Context::new(SessionOptions::default())?;
//!     ctx.register_handler(Arc::new(PdfHandler::new()));
//!
//!     let session = Session::open_path_in(ctx, "document.pdf")?;
//!     println!("{} pages", session.page_count());
//!     Ok(())
//! }
//! ```

mod pdf;

pub use pdf::PdfHandler;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::context::Context;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::geometry::{Rect, Transform};

/// A read-only in-memory byte stream handed to handlers.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Arc<[u8]>,
}

impl MemoryStream {
    /// Wrap a byte buffer. Empty buffers cannot back a document stream.
    pub fn open(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::StreamOpen("empty buffer".to_string()));
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A format handler able to open documents of one family.
///
/// Implement this trait to add support for a new document format.
pub trait DocumentHandler: Send + Sync {
    /// Name of this handler.
    fn name(&self) -> &str;

    /// MIME types this handler accepts, lowercase.
    fn mime_types(&self) -> &[&str];

    /// File extensions this handler accepts, lowercase without the dot.
    fn extensions(&self) -> &[&str];

    /// Whether the leading bytes of a file look like this format.
    fn recognize(&self, header: &[u8]) -> bool {
        let _ = header;
        false
    }

    /// Open a document from a stream.
    fn open_stream(&self, ctx: &Context, stream: MemoryStream) -> Result<Box<dyn Document>>;

    /// Open a document from a file. Reads the whole file by default.
    fn open_path(&self, ctx: &Context, path: &Path) -> Result<Box<dyn Document>> {
        let data = fs::read(path)?;
        self.open_stream(ctx, MemoryStream::open(data)?)
    }
}

/// A loaded document.
pub trait Document {
    /// Whether the document is encrypted and cannot be decoded without a
    /// password.
    fn needs_password(&self) -> bool;

    /// Number of pages; zero for degenerate documents.
    fn page_count(&self, ctx: &Context) -> usize;

    /// Load one page. The page borrows the document and cannot outlive it.
    fn load_page(&self, ctx: &Context, index: usize) -> Result<Box<dyn Page + '_>>;
}

/// One loaded page.
pub trait Page {
    /// Page bounds in page space (points, y down).
    fn bounds(&self) -> Rect;

    /// Run the page content through `device`, with `ctm` applied after the
    /// page's own transform.
    fn run(&self, ctx: &Context, device: &mut dyn Device, ctm: &Transform) -> Result<()>;
}

/// Registry of document handlers.
///
/// Maps MIME types and file extensions to handlers; keeps registration order
/// for content sniffing.
#[derive(Default)]
pub struct HandlerRegistry {
    by_mime: HashMap<String, Arc<dyn DocumentHandler>>,
    by_extension: HashMap<String, Arc<dyn DocumentHandler>>,
    ordered: Vec<Arc<dyn DocumentHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register the built-in handlers (PDF).
    pub fn register_defaults(&mut self) {
        self.register(Arc::new(PdfHandler::new()));
    }

    /// Register a handler for all its MIME types and extensions. Later
    /// registrations win.
    pub fn register(&mut self, handler: Arc<dyn DocumentHandler>) {
        log::debug!("registering document handler '{}'", handler.name());
        for mime in handler.mime_types() {
            self.by_mime.insert(mime.to_lowercase(), handler.clone());
        }
        for ext in handler.extensions() {
            self.by_extension.insert(ext.to_lowercase(), handler.clone());
        }
        self.ordered.retain(|h| h.name() != handler.name());
        self.ordered.push(handler);
    }

    pub fn by_mime(&self, mime: &str) -> Option<Arc<dyn DocumentHandler>> {
        self.by_mime.get(&mime.to_lowercase()).cloned()
    }

    pub fn by_extension(&self, ext: &str) -> Option<Arc<dyn DocumentHandler>> {
        self.by_extension.get(&ext.to_lowercase()).cloned()
    }

    /// First handler (latest registered first) recognising `header`.
    pub fn sniff(&self, header: &[u8]) -> Option<Arc<dyn DocumentHandler>> {
        self.ordered.iter().rev().find(|h| h.recognize(header)).cloned()
    }

    /// Pick a handler for a file: by extension, then by content.
    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn DocumentHandler>> {
        if let Some(handler) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.by_extension(ext))
        {
            return Ok(handler);
        }

        let header = crate::detect::read_header(path)?;
        if let Some(handler) = self.sniff(&header) {
            return Ok(handler);
        }

        let reason = match crate::detect::detect_format(&header) {
            Some(format) => format!("no handler registered for {}", format.mime_type()),
            None => format!("unrecognised document format: {}", path.display()),
        };
        Err(Error::DocumentOpen(reason))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Names of registered handlers, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|h| h.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;

    impl DocumentHandler for NullHandler {
        fn name(&self) -> &str {
            "null"
        }

        fn mime_types(&self) -> &[&str] {
            &["application/x-null"]
        }

        fn extensions(&self) -> &[&str] {
            &["null"]
        }

        fn recognize(&self, header: &[u8]) -> bool {
            header.starts_with(b"NULL")
        }

        fn open_stream(&self, _ctx: &Context, _stream: MemoryStream) -> Result<Box<dyn Document>> {
            Err(Error::DocumentOpen("null documents cannot be opened".to_string()))
        }
    }

    #[test]
    fn test_memory_stream_rejects_empty() {
        let err = MemoryStream::open(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::StreamOpen(_)));

        let stream = MemoryStream::open(b"abc".to_vec()).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.as_bytes(), b"abc");
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = HandlerRegistry::with_defaults();
        assert!(registry.by_mime("application/pdf").is_some());
        assert!(registry.by_mime("Application/PDF").is_some());
        assert!(registry.by_extension("pdf").is_some());
        assert!(registry.by_extension("epub").is_none());
        assert_eq!(registry.names(), vec!["pdf"]);
    }

    #[test]
    fn test_registry_sniff() {
        let mut registry = HandlerRegistry::with_defaults();
        registry.register(Arc::new(NullHandler));

        assert_eq!(registry.sniff(b"NULL....").unwrap().name(), "null");
        assert_eq!(registry.sniff(b"%PDF-1.7").unwrap().name(), "pdf");
        assert!(registry.sniff(b"GIF89a").is_none());
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NullHandler));
        registry.register(Arc::new(NullHandler));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_for_path_falls_back_to_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_extension");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();

        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.for_path(&path).unwrap().name(), "pdf");

        let epub = dir.path().join("book.epub");
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(b"mimetypeapplication/epub+zip");
        std::fs::write(&epub, data).unwrap();
        match registry.for_path(&epub) {
            Err(Error::DocumentOpen(reason)) => assert!(reason.contains("epub")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("epub should have no handler"),
        }
    }
}
