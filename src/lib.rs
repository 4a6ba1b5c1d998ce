//! # rasterpage
//!
//! Render pages of page-oriented documents to RGBA images.
//!
//! A [`Session`] opens a document from a path, a byte buffer or a reader,
//! reports its page count and renders any page at 300 DPI onto a white
//! background. PDF is supported out of the box; other formats plug in through
//! [`handler::DocumentHandler`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use rasterpage::Session;
//!
//! fn main() -> rasterpage::Result<()> {
//!     let session = Session::open_path("document.pdf")?;
//!     println!("{} pages", session.page_count());
//!
//!     let image = session.render_page(0)?;
//!     image.save("page-1.png").expect("write png");
//!
//!     session.close()
//! }
//! ```
//!
//! ## Features
//!
//! - **Fixed resolution**: pages render at 300 DPI, one page unit = 1/72 inch
//! - **Vector content**: fills, strokes, clipping, dashes and transparency
//! - **Images**: DCT, Flate and uncompressed image XObjects, cached per session
//! - **Pluggable formats**: handlers are chosen by MIME type, extension or content
//! - **Deterministic output**: the same page always produces the same pixels

pub mod context;
pub mod detect;
pub mod device;
pub mod error;
pub mod geometry;
pub mod handler;
pub mod options;
pub mod pixmap;
pub mod session;

// Re-export commonly used types
pub use context::Context;
pub use detect::{detect_format, detect_format_from_path, DocumentFormat};
pub use device::{Color, Device, DrawDevice, FillRule, ImageData, StrokeStyle};
pub use error::{Error, Result};
pub use geometry::{IRect, Path as PagePath, Point, Rect, Transform};
pub use handler::{Document, DocumentHandler, HandlerRegistry, MemoryStream, Page};
pub use image::RgbaImage;
pub use options::{CacheBudget, SessionOptions};
pub use pixmap::PixelBuffer;
pub use session::{DocumentInfo, PageInfo, Session, BASE_DPI, RESOLUTION_DPI};

use std::io::Read;
use std::path::Path;

/// Render one page of a document file.
///
/// Opens a session, renders page `index` and closes the session again. Use a
/// [`Session`] directly when rendering several pages.
///
/// # Example
///
/// ```no_run
/// use rasterpage::render_file_page;
///
/// let image = render_file_page("document.pdf", 0).unwrap();
/// assert_eq!(image.width(), 2550);
/// ```
pub fn render_file_page<P: AsRef<Path>>(path: P, index: usize) -> Result<RgbaImage> {
    let session = Session::open_path(path)?;
    let image = session.render_page(index)?;
    session.close()?;
    Ok(image)
}

/// Render one page of a document held in memory.
pub fn render_bytes_page(data: &[u8], index: usize) -> Result<RgbaImage> {
    let session = Session::open_bytes(data)?;
    let image = session.render_page(index)?;
    session.close()?;
    Ok(image)
}

/// Render one page of a document read from `reader`.
pub fn render_reader_page<R: Read>(reader: R, index: usize) -> Result<RgbaImage> {
    let session = Session::open_reader(reader)?;
    let image = session.render_page(index)?;
    session.close()?;
    Ok(image)
}

/// Count the pages of a document file.
pub fn page_count<P: AsRef<Path>>(path: P) -> Result<usize> {
    let session = Session::open_path(path)?;
    let count = session.page_count();
    session.close()?;
    Ok(count)
}
