//! PDF document handler backed by lopdf.

mod content;
mod image;
mod interpret;

use std::path::Path;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use super::{Document, DocumentHandler, MemoryStream, Page};
use crate::context::Context;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::geometry::{Rect, Transform};

use interpret::Interpreter;

/// US Letter, used when a page tree carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: Rect = Rect::new(0.0, 0.0, 612.0, 792.0);

/// Maximum `Parent` hops followed when resolving inherited attributes.
const MAX_INHERIT_DEPTH: usize = 32;

static NULL_OBJECT: Object = Object::Null;

/// PDF document handler.
#[derive(Debug, Clone, Default)]
pub struct PdfHandler {
    _private: (),
}

impl PdfHandler {
    /// Create a new PDF handler.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl DocumentHandler for PdfHandler {
    fn name(&self) -> &str {
        "pdf"
    }

    fn mime_types(&self) -> &[&str] {
        &["application/pdf", "application/x-pdf"]
    }

    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn recognize(&self, header: &[u8]) -> bool {
        crate::detect::is_pdf_bytes(header)
    }

    fn open_stream(&self, _ctx: &Context, stream: MemoryStream) -> Result<Box<dyn Document>> {
        let doc = LopdfDocument::load_mem(stream.as_bytes()).map_err(open_error)?;
        Ok(Box::new(PdfDocument::new(doc)))
    }

    fn open_path(&self, _ctx: &Context, path: &Path) -> Result<Box<dyn Document>> {
        let doc = LopdfDocument::load(path).map_err(open_error)?;
        Ok(Box::new(PdfDocument::new(doc)))
    }
}

/// Every lopdf failure at open time means the content could not be parsed.
fn open_error(err: lopdf::Error) -> Error {
    if matches!(err, lopdf::Error::Decryption(_)) {
        return Error::DocumentOpen(format!(
            "encrypted content could not be decrypted: {}",
            err
        ));
    }
    Error::DocumentOpen(err.to_string())
}

/// A parsed PDF document.
pub struct PdfDocument {
    doc: LopdfDocument,
    page_ids: Vec<ObjectId>,
}

impl PdfDocument {
    fn new(doc: LopdfDocument) -> Self {
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        log::debug!(
            "opened PDF {} with {} pages (encrypted: {})",
            doc.version,
            page_ids.len(),
            doc.is_encrypted()
        );
        Self { doc, page_ids }
    }

    /// Return the raw (decompressed) content stream bytes for a page.
    fn page_content(&self, page: &Dictionary) -> Result<Vec<u8>> {
        let contents = match page.get(b"Contents") {
            Ok(contents) => contents,
            // A page without Contents is blank.
            Err(_) => return Ok(Vec::new()),
        };

        match resolve(&self.doc, contents) {
            Object::Stream(s) => s
                .decompressed_content()
                .or_else(|_| Ok(s.content.clone())),
            Object::Array(arr) => {
                let mut content = Vec::new();
                for obj in arr {
                    if let Object::Stream(s) = resolve(&self.doc, obj) {
                        match s.decompressed_content() {
                            Ok(data) => content.extend_from_slice(&data),
                            Err(_) => content.extend_from_slice(&s.content),
                        }
                        content.push(b'\n');
                    }
                }
                Ok(content)
            }
            Object::Null => Ok(Vec::new()),
            _ => Err(Error::Render("invalid content stream".to_string())),
        }
    }
}

impl Document for PdfDocument {
    fn needs_password(&self) -> bool {
        self.doc.is_encrypted()
    }

    fn page_count(&self, _ctx: &Context) -> usize {
        self.page_ids.len()
    }

    fn load_page(&self, _ctx: &Context, index: usize) -> Result<Box<dyn Page + '_>> {
        let id = *self
            .page_ids
            .get(index)
            .ok_or(Error::PageIndexOutOfRange {
                index,
                page_count: self.page_ids.len(),
            })?;
        let dict = self
            .doc
            .get_dictionary(id)
            .map_err(|e| Error::Render(format!("page object {:?}: {}", id, e)))?;

        let media_box = inherited(&self.doc, dict, b"MediaBox")
            .and_then(|o| rect_from_object(&self.doc, o))
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let visible_box = inherited(&self.doc, dict, b"CropBox")
            .and_then(|o| rect_from_object(&self.doc, o))
            .map(|crop| crop.intersect(&media_box))
            .filter(|r| !r.is_empty())
            .unwrap_or(media_box);
        let rotate = inherited(&self.doc, dict, b"Rotate")
            .and_then(|o| number(resolve(&self.doc, o)))
            .unwrap_or(0.0);

        let ctm = page_transform(&visible_box, rotate);
        let bounds = visible_box.transform(&ctm);

        let operations = content::decode_content(&self.page_content(dict)?)?;

        let resources = inherited(&self.doc, dict, b"Resources")
            .and_then(|o| resolve(&self.doc, o).as_dict().ok());

        log::trace!(
            "loaded page {} ({} operations, bounds {:?})",
            index,
            operations.len(),
            bounds
        );

        Ok(Box::new(PdfPage {
            doc: &self.doc,
            ctm,
            bounds,
            operations,
            resources,
        }))
    }
}

/// One PDF page with its decoded content stream.
struct PdfPage<'a> {
    doc: &'a LopdfDocument,
    /// PDF user space to page space.
    ctm: Transform,
    bounds: Rect,
    operations: Vec<lopdf::content::Operation>,
    resources: Option<&'a Dictionary>,
}

impl Page for PdfPage<'_> {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn run(&self, ctx: &Context, device: &mut dyn Device, ctm: &Transform) -> Result<()> {
        let mut interpreter = Interpreter::new(self.doc, ctx, self.ctm.concat(ctm));
        interpreter.run_page(&self.operations, self.resources, device)
    }
}

/// Map PDF user space (y up) to page space (y down, origin at the visible
/// box's top-left corner), applying `/Rotate` clockwise.
fn page_transform(visible_box: &Rect, rotate: f32) -> Transform {
    let rotate = (rotate / 90.0).round() * 90.0;
    let flip = Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, 0.0);
    let m = flip.concat(&Transform::rotate(rotate));
    let moved = visible_box.transform(&m);
    m.concat(&Transform::translate(-moved.x0, -moved.y0))
}

/// Follow references until a direct object is reached.
fn resolve<'a>(doc: &'a LopdfDocument, mut obj: &'a Object) -> &'a Object {
    for _ in 0..MAX_INHERIT_DEPTH {
        match obj {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => obj = target,
                Err(_) => return &NULL_OBJECT,
            },
            _ => return obj,
        }
    }
    &NULL_OBJECT
}

/// Look up a page attribute, walking up the page tree.
fn inherited<'a>(doc: &'a LopdfDocument, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve(doc, parent).as_dict().ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn rect_from_object(doc: &LopdfDocument, obj: &Object) -> Option<Rect> {
    let values: Vec<f32> = resolve(doc, obj)
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| number(resolve(doc, o)))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => Some(Rect::from_corners(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}
