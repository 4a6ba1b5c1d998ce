//! Document format detection from magic bytes.

use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected when sniffing a file.
pub const HEADER_LEN: usize = 1024;

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
/// Local file header signature of a ZIP container.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// EPUB requires an uncompressed `mimetype` entry first, holding this value.
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";
/// Part names found near the start of XPS / OpenXPS packages.
const XPS_MARKERS: [&[u8]; 3] = [b"FixedDocumentSequence", b"_rels/.rels", b"[Content_Types].xml"];

/// Document formats recognised from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Xps,
}

impl DocumentFormat {
    /// Canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Epub => "application/epub+zip",
            DocumentFormat::Xps => "application/oxps",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::Pdf => write!(f, "PDF"),
            DocumentFormat::Epub => write!(f, "EPUB"),
            DocumentFormat::Xps => write!(f, "XPS"),
        }
    }
}

/// Read up to [`HEADER_LEN`] leading bytes of a file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Detect the format of a document from its leading bytes.
pub fn detect_format(header: &[u8]) -> Option<DocumentFormat> {
    if is_pdf_bytes(header) {
        return Some(DocumentFormat::Pdf);
    }
    if header.starts_with(ZIP_MAGIC) {
        if contains(header, EPUB_MIMETYPE) {
            return Some(DocumentFormat::Epub);
        }
        if XPS_MARKERS.iter().any(|m| contains(header, m)) {
            return Some(DocumentFormat::Xps);
        }
    }
    None
}

/// Detect the format of a file from its leading bytes.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<Option<DocumentFormat>> {
    Ok(detect_format(&read_header(path)?))
}

/// Check for a PDF header.
///
/// Some producers put junk before the header, so it is searched for in the
/// whole slice rather than only at offset zero.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    contains(data, PDF_MAGIC)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
