//! Document sessions: open a document once, render its pages to images.

use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::device::{Device, DrawDevice};
use crate::error::{Error, Result};
use crate::geometry::{IRect, Rect, Transform};
use crate::handler::{Document, MemoryStream};
use crate::options::SessionOptions;
use crate::pixmap::PixelBuffer;

/// Output resolution of [`Session::render_page`].
pub const RESOLUTION_DPI: f32 = 300.0;

/// Resolution of page space: one unit is one point.
pub const BASE_DPI: f32 = 72.0;

/// An open document together with the context that decoded it.
///
/// A session is single-owner and stays on the thread that opened it. Render
/// from several threads by opening one session per worker.
///
/// # Example
///
/// ```no_run
/// use rasterpage::Session;
///
/// let session = Session::open_path("document.pdf")?;
/// for index in 0..session.page_count() {
///     let image = session.render_page(index)?;
///     println!("page {}: {}x{}", index, image.width(), image.height());
/// }
/// session.close()?;
/// # Ok::<(), rasterpage::Error>(())
/// ```
pub struct Session {
    // Field order matters: the document must drop before its context.
    document: Box<dyn Document>,
    context: Context,
    needs_password: bool,
    handler: String,
}

impl Session {
    /// Open a document file with default options.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_path_with_options(path, SessionOptions::default())
    }

    /// Open a document file with custom options.
    pub fn open_path_with_options<P: AsRef<Path>>(path: P, options: SessionOptions) -> Result<Self> {
        let ctx = default_context(options)?;
        Self::open_path_in(ctx, path)
    }

    /// Open a document file in a caller-prepared context.
    ///
    /// The path is resolved against the current directory; handlers are
    /// chosen by file extension, then by the file's leading bytes.
    pub fn open_path_in<P: AsRef<Path>>(ctx: Context, path: P) -> Result<Self> {
        let path = absolutize(path.as_ref())?;
        if fs::metadata(&path).is_err() {
            return Err(Error::FileNotFound(path));
        }

        let handler = ctx.handlers().for_path(&path)?;
        log::debug!("opening {} with '{}' handler", path.display(), handler.name());
        let document = handler.open_path(&ctx, &path)?;
        Ok(Self::new(ctx, document, handler.name()))
    }

    /// Open a document held in memory with default options.
    ///
    /// The handler is picked from the options' format hint, which defaults to
    /// PDF; the bytes are not sniffed.
    pub fn open_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::open_bytes_with_options(data, SessionOptions::default())
    }

    /// Open a document held in memory with custom options.
    pub fn open_bytes_with_options(
        data: impl Into<Arc<[u8]>>,
        options: SessionOptions,
    ) -> Result<Self> {
        let ctx = default_context(options)?;
        Self::open_bytes_in(ctx, data)
    }

    /// Open a document held in memory in a caller-prepared context.
    pub fn open_bytes_in(ctx: Context, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let stream = MemoryStream::open(data)?;
        let hint = ctx.options().format_hint.clone();
        let handler = ctx
            .handlers()
            .by_mime(&hint)
            .ok_or_else(|| Error::DocumentOpen(format!("no handler registered for {}", hint)))?;

        log::debug!(
            "opening {} byte stream as {} with '{}' handler",
            stream.len(),
            hint,
            handler.name()
        );
        let document = handler.open_stream(&ctx, stream)?;
        Ok(Self::new(ctx, document, handler.name()))
    }

    /// Read a document from `reader` to the end and open it with default
    /// options.
    pub fn open_reader<R: Read>(reader: R) -> Result<Self> {
        Self::open_reader_with_options(reader, SessionOptions::default())
    }

    /// Read a document from `reader` to the end and open it.
    ///
    /// Read failures are returned as [`Error::Io`] without rewrapping.
    pub fn open_reader_with_options<R: Read>(mut reader: R, options: SessionOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::open_bytes_with_options(data, options)
    }

    fn new(context: Context, document: Box<dyn Document>, handler: &str) -> Self {
        let needs_password = document.needs_password();
        if needs_password {
            log::warn!("document is encrypted and needs a password");
        }
        Self {
            document,
            context,
            needs_password,
            handler: handler.to_string(),
        }
    }

    /// Number of pages. Zero for degenerate documents.
    pub fn page_count(&self) -> usize {
        self.document.page_count(&self.context)
    }

    /// Whether the document cannot be decoded without a password.
    pub fn needs_password(&self) -> bool {
        self.needs_password
    }

    /// [`Error::NeedsPassword`] when the document is encrypted.
    pub fn check_password(&self) -> Result<()> {
        if self.needs_password {
            return Err(Error::NeedsPassword);
        }
        Ok(())
    }

    /// Name of the handler that opened the document.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    /// The context that owns the document's handlers and resource store.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Geometry of one page without rendering it.
    pub fn page_info(&self, index: usize) -> Result<PageInfo> {
        self.check_index(index)?;
        let page = self.document.load_page(&self.context, index)?;
        let bounds = page.bounds();
        Ok(PageInfo {
            index,
            bounds,
            pixel_bbox: bounds.transform(&render_transform()).round(),
        })
    }

    /// Summary of the document and every page.
    ///
    /// Page geometry is left out for documents that need a password.
    pub fn info(&self) -> Result<DocumentInfo> {
        let pages = if self.needs_password {
            Vec::new()
        } else {
            (0..self.page_count())
                .map(|index| self.page_info(index))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(DocumentInfo {
            handler: self.handler.clone(),
            page_count: self.page_count(),
            needs_password: self.needs_password,
            pages,
        })
    }

    /// Render page `index` at 300 DPI into an RGBA image.
    ///
    /// The page is loaded, drawn onto a white buffer and released again for
    /// every call; nothing is kept between calls except decoded resources in
    /// the context store.
    pub fn render_page(&self, index: usize) -> Result<RgbaImage> {
        self.check_index(index)?;
        self.check_password()?;

        let page = self.document.load_page(&self.context, index)?;

        let ctm = render_transform();
        let bbox = page.bounds().transform(&ctm).round();
        log::debug!(
            "rendering page {} at {}x{} pixels",
            index,
            bbox.width(),
            bbox.height()
        );

        let mut pix = PixelBuffer::with_bbox(bbox)?;
        pix.clear_with_value(0xff);

        {
            let mut device = DrawDevice::new(ctm, &mut pix)?;
            page.run(&self.context, &mut device, &Transform::identity())?;
            device.close()?;
        }

        pix.samples()?;
        let image = pix.into_image()?;
        drop(page);
        Ok(image)
    }

    /// Release the document, then its context.
    pub fn close(self) -> Result<()> {
        let Session {
            document, context, ..
        } = self;
        drop(document);
        drop(context);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let page_count = self.page_count();
        if index >= page_count {
            return Err(Error::PageIndexOutOfRange { index, page_count });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handler", &self.handler)
            .field("page_count", &self.page_count())
            .field("needs_password", &self.needs_password)
            .finish()
    }
}

/// Page space to render pixels.
pub fn render_transform() -> Transform {
    let k = RESOLUTION_DPI / BASE_DPI;
    Transform::scale(k, k)
}

fn default_context(options: SessionOptions) -> Result<Context> {
    let mut ctx = Context::new(options)?;
    ctx.register_document_handlers();
    Ok(ctx)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

/// Geometry of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Zero-based page index.
    pub index: usize,
    /// Bounds in page space (points).
    pub bounds: Rect,
    /// Pixel rectangle produced by [`Session::render_page`].
    pub pixel_bbox: IRect,
}

impl PageInfo {
    /// Rendered width in pixels.
    pub fn pixel_width(&self) -> i64 {
        self.pixel_bbox.width()
    }

    /// Rendered height in pixels.
    pub fn pixel_height(&self) -> i64 {
        self.pixel_bbox.height()
    }
}

/// Summary of an open document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub handler: String,
    pub page_count: usize,
    pub needs_password: bool,
    pub pages: Vec<PageInfo>,
}

impl DocumentInfo {
    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
