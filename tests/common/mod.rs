//! Test documents built with lopdf.

#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// US Letter in points.
pub const LETTER: [i64; 4] = [0, 0, 612, 792];

/// One page of a generated test document.
#[derive(Debug, Clone)]
pub struct TestPage {
    pub media_box: [i64; 4],
    pub crop_box: Option<[i64; 4]>,
    pub rotate: Option<i64>,
    pub content: Vec<u8>,
    pub resources: Option<Dictionary>,
}

impl TestPage {
    pub fn letter(content: &str) -> Self {
        Self::sized(LETTER, content)
    }

    pub fn sized(media_box: [i64; 4], content: &str) -> Self {
        Self::with_content(media_box, content.as_bytes().to_vec())
    }

    /// Letter page whose content holds binary data, such as inline images.
    pub fn letter_bytes(content: &[u8]) -> Self {
        Self::with_content(LETTER, content.to_vec())
    }

    fn with_content(media_box: [i64; 4], content: Vec<u8>) -> Self {
        Self {
            media_box,
            crop_box: None,
            rotate: None,
            content,
            resources: None,
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    pub fn cropped(mut self, crop_box: [i64; 4]) -> Self {
        self.crop_box = Some(crop_box);
        self
    }

    pub fn with_resources(mut self, resources: Dictionary) -> Self {
        self.resources = Some(resources);
        self
    }
}

fn rect(values: [i64; 4]) -> Object {
    Object::Array(values.iter().map(|v| Object::Integer(*v)).collect())
}

/// Build a PDF, letting `setup` add shared objects (images, forms) whose
/// resources the pages then reference.
pub fn build_pdf_with(setup: impl FnOnce(&mut Document) -> Vec<TestPage>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages = setup(&mut doc);
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for page in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, page.content));
        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect(page.media_box),
            "Contents" => content_id,
        };
        if let Some(crop) = page.crop_box {
            dict.set("CropBox", rect(crop));
        }
        if let Some(rotate) = page.rotate {
            dict.set("Rotate", rotate);
        }
        if let Some(resources) = page.resources {
            dict.set("Resources", resources);
        }
        kids.push(Object::Reference(doc.add_object(dict)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialize test pdf");
    buf
}

pub fn build_pdf(pages: Vec<TestPage>) -> Vec<u8> {
    build_pdf_with(|_| pages)
}

/// A document with `count` blank Letter pages.
pub fn blank_pdf(count: usize) -> Vec<u8> {
    build_pdf((0..count).map(|_| TestPage::letter("")).collect())
}

/// Pixel at (x, y) of a rendered page.
pub fn pixel(image: &rasterpage::RgbaImage, x: u32, y: u32) -> [u8; 4] {
    image.get_pixel(x, y).0
}

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];
pub const BLACK: [u8; 4] = [0, 0, 0, 255];
