//! End-to-end tests: open generated PDFs and render their pages.

mod common;

use std::io::{self, Read};

use common::{blank_pdf, build_pdf, build_pdf_with, pixel, TestPage, BLACK, BLUE, RED, WHITE};
use lopdf::{dictionary, Object, Stream};
use rasterpage::{CacheBudget, Error, Session, SessionOptions};

#[test]
fn test_letter_page_dimensions() {
    let session = Session::open_bytes(blank_pdf(1)).unwrap();
    assert_eq!(session.page_count(), 1);

    let image = session.render_page(0).unwrap();
    assert_eq!(image.width(), 2550);
    assert_eq!(image.height(), 3300);
    assert_eq!(image.as_raw().len(), 2550 * 3300 * 4);
    session.close().unwrap();
}

#[test]
fn test_blank_page_is_white() {
    let session = Session::open_bytes(blank_pdf(1)).unwrap();
    let image = session.render_page(0).unwrap();
    assert!(image.as_raw().iter().all(|&b| b == 0xff));
}

#[test]
fn test_a4_and_small_page_sizes() {
    let data = build_pdf(vec![
        TestPage::sized([0, 0, 595, 842], ""),
        TestPage::sized([0, 0, 200, 100], ""),
    ]);
    let session = Session::open_bytes(data).unwrap();
    assert_eq!(session.page_count(), 2);

    let a4 = session.render_page(0).unwrap();
    assert_eq!(a4.dimensions(), (2479, 3508));

    let small = session.render_page(1).unwrap();
    assert_eq!(small.dimensions(), (833, 417));
}

#[test]
fn test_filled_rectangle_lands_in_place() {
    // 72pt from the left and bottom edges, 2in wide.
    let data = build_pdf(vec![TestPage::letter("1 0 0 rg 72 72 144 144 re f")]);
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    // PDF y-up (72..216) becomes y-down (576..720), times 300/72.
    assert_eq!(pixel(&image, 600, 2700), RED);
    assert_eq!(pixel(&image, 310, 2410), RED);
    assert_eq!(pixel(&image, 890, 2990), RED);
    assert_eq!(pixel(&image, 600, 600), WHITE);
    assert_eq!(pixel(&image, 1200, 2700), WHITE);
    assert_eq!(pixel(&image, 600, 3100), WHITE);
}

#[test]
fn test_clip_limits_painting() {
    let data = build_pdf(vec![TestPage::letter(
        "q 0 0 306 792 re W n 0 0 1 rg 0 0 612 792 re f Q",
    )]);
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    assert_eq!(pixel(&image, 600, 1000), BLUE);
    assert_eq!(pixel(&image, 2000, 1000), WHITE);
}

#[test]
fn test_image_xobject_is_drawn() {
    let data = build_pdf_with(|doc| {
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0, 0, 0, 255],
        ));
        let resources = dictionary! {
            "XObject" => dictionary! { "Im1" => image },
        };
        vec![TestPage::letter("q 612 0 0 792 0 0 cm /Im1 Do Q").with_resources(resources)]
    });
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    assert_eq!(pixel(&image, 300, 1650), RED);
    assert_eq!(pixel(&image, 2250, 1650), BLUE);
    assert_eq!(session.context().store().len(), 1);
}

#[test]
fn test_content_after_inline_image_is_drawn() {
    let data = build_pdf(vec![TestPage::letter_bytes(
        b"1 0 0 rg 0 0 612 792 re f \
          q 100 0 0 100 0 692 cm BI /W 4 /H 1 /CS /G /BPC 8 ID \x00\x00\x00\x00 EI Q \
          0 0 1 rg 0 0 612 396 re f",
    )]);
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    // Inline image in the top-left 100pt square.
    assert_eq!(pixel(&image, 200, 200), BLACK);
    // Red page background outside it.
    assert_eq!(pixel(&image, 1000, 1000), RED);
    // Blue lower half painted after EI.
    assert_eq!(pixel(&image, 1000, 3000), BLUE);
}

#[test]
fn test_bad_predictor_image_is_skipped() {
    let data = build_pdf_with(|doc| {
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
                "DecodeParms" => dictionary! {
                    "Predictor" => 12,
                    "Columns" => 1_000_000_000_000i64,
                },
            },
            // zlib stream of [0, 0]
            vec![0x78, 0x9c, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01],
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Im1" => image } };
        vec![TestPage::letter(
            "q 612 0 0 792 0 0 cm /Im1 Do Q 0 0 1 rg 0 0 612 792 re f",
        )
        .with_resources(resources)]
    });
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();
    assert_eq!(pixel(&image, 1000, 1000), BLUE);
}

#[test]
fn test_form_cannot_pop_page_clip() {
    let data = build_pdf_with(|doc| {
        let form = doc.add_object(Stream::new(
            dictionary! { "Subtype" => "Form" },
            b"Q Q".to_vec(),
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Fm1" => form } };
        vec![TestPage::letter(
            "q 0 0 306 792 re W n q /Fm1 Do Q 1 0 0 rg 0 0 612 792 re f Q",
        )
        .with_resources(resources)]
    });
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    assert_eq!(pixel(&image, 600, 1000), RED);
    assert_eq!(pixel(&image, 2400, 1000), WHITE);
}

#[test]
fn test_encrypted_pdf_needs_password() {
    let data = build_pdf_with(|doc| {
        let encrypt = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => Object::string_literal(vec![0u8; 32]),
            "U" => Object::string_literal(vec![0u8; 32]),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt);
        vec![TestPage::letter(""), TestPage::letter("")]
    });
    let session = Session::open_bytes(data).unwrap();

    assert!(session.needs_password());
    assert_eq!(session.page_count(), 2);
    assert!(matches!(session.check_password(), Err(Error::NeedsPassword)));
    assert!(matches!(session.render_page(0), Err(Error::NeedsPassword)));
    // The index is still checked first.
    assert!(matches!(
        session.render_page(2),
        Err(Error::PageIndexOutOfRange { index: 2, page_count: 2 })
    ));
}

#[test]
fn test_rotated_page_swaps_dimensions() {
    let data = build_pdf(vec![TestPage::letter("").rotated(90)]);
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();
    assert_eq!(image.dimensions(), (3300, 2550));
}

#[test]
fn test_rotated_content_position() {
    // Bottom-left inch of the unrotated page ends up top-left after 90° cw.
    let data = build_pdf(vec![TestPage::letter("1 0 0 rg 0 0 72 72 re f").rotated(90)]);
    let session = Session::open_bytes(data).unwrap();
    let image = session.render_page(0).unwrap();

    assert_eq!(pixel(&image, 150, 150), RED);
    assert_eq!(pixel(&image, 3150, 2400), WHITE);
}

#[test]
fn test_crop_box_limits_bounds() {
    let data = build_pdf(vec![TestPage::letter("").cropped([0, 0, 306, 396])]);
    let session = Session::open_bytes(data).unwrap();
    let info = session.page_info(0).unwrap();
    assert_eq!(info.bounds.width(), 306.0);
    assert_eq!(info.pixel_width(), 1275);
    assert_eq!(info.pixel_height(), 1650);

    let image = session.render_page(0).unwrap();
    assert_eq!(image.dimensions(), (1275, 1650));
}

#[test]
fn test_rendering_is_deterministic() {
    let data = build_pdf(vec![TestPage::letter(
        "0.2 0.4 0.6 rg 100 100 m 500 150 l 300 600 l h f 3 w 0 0 1 RG 50 50 500 700 re S",
    )]);

    let first = Session::open_bytes(data.clone()).unwrap();
    let second = Session::open_bytes(data).unwrap();
    let a = first.render_page(0).unwrap();
    let b = first.render_page(0).unwrap();
    let c = second.render_page(0).unwrap();

    assert_eq!(a.as_raw(), b.as_raw());
    assert_eq!(a.as_raw(), c.as_raw());
}

#[test]
fn test_page_order_is_preserved() {
    let data = build_pdf(vec![
        TestPage::letter("1 0 0 rg 0 0 612 792 re f"),
        TestPage::letter("0 0 1 rg 0 0 612 792 re f"),
    ]);
    let session = Session::open_bytes(data).unwrap();
    assert_eq!(pixel(&session.render_page(0).unwrap(), 10, 10), RED);
    assert_eq!(pixel(&session.render_page(1).unwrap(), 10, 10), BLUE);
}

#[test]
fn test_page_index_out_of_range() {
    let session = Session::open_bytes(blank_pdf(2)).unwrap();
    match session.render_page(2) {
        Err(Error::PageIndexOutOfRange { index, page_count }) => {
            assert_eq!(index, 2);
            assert_eq!(page_count, 2);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // The session stays usable after a failed call.
    assert!(session.render_page(1).is_ok());
}

#[test]
fn test_zero_page_document() {
    let session = Session::open_bytes(blank_pdf(0)).unwrap();
    assert_eq!(session.page_count(), 0);
    assert!(matches!(
        session.render_page(0),
        Err(Error::PageIndexOutOfRange { index: 0, page_count: 0 })
    ));
    let info = session.info().unwrap();
    assert!(info.pages.is_empty());
}

#[test]
fn test_open_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.pdf");
    std::fs::write(&path, blank_pdf(3)).unwrap();

    let session = Session::open_path(&path).unwrap();
    assert_eq!(session.page_count(), 3);
    assert_eq!(session.handler_name(), "pdf");
    assert!(!session.needs_password());
    session.check_password().unwrap();
    session.close().unwrap();
}

#[test]
fn test_open_path_without_extension_sniffs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample");
    std::fs::write(&path, blank_pdf(1)).unwrap();

    let session = Session::open_path(&path).unwrap();
    assert_eq!(session.page_count(), 1);
}

#[test]
fn test_open_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.pdf");
    match Session::open_path(&path) {
        Err(Error::FileNotFound(reported)) => assert_eq!(reported, path),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_open_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.pdf");
    std::fs::write(&path, b"this is not a pdf at all").unwrap();
    assert!(matches!(Session::open_path(&path), Err(Error::DocumentOpen(_))));
}

#[test]
fn test_open_unrecognised_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"plain text").unwrap();
    assert!(matches!(Session::open_path(&path), Err(Error::DocumentOpen(_))));
}

#[test]
fn test_open_empty_bytes() {
    assert!(matches!(Session::open_bytes(Vec::new()), Err(Error::StreamOpen(_))));
}

#[test]
fn test_open_garbage_bytes() {
    assert!(matches!(
        Session::open_bytes(b"GIF89a garbage".to_vec()),
        Err(Error::DocumentOpen(_))
    ));
}

#[test]
fn test_open_reader() {
    let data = blank_pdf(2);
    let session = Session::open_reader(io::Cursor::new(data)).unwrap();
    assert_eq!(session.page_count(), 2);
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reader broke"))
    }
}

#[test]
fn test_reader_error_is_preserved() {
    match Session::open_reader(FailingReader) {
        Err(Error::Io(e)) => {
            assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
            assert_eq!(e.to_string(), "reader broke");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_bounded_cache_still_renders() {
    let options = SessionOptions::new().with_cache_budget(CacheBudget::Bytes(4));
    let data = build_pdf_with(|doc| {
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 0, 0, 0],
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Im1" => image } };
        vec![TestPage::letter("q 612 0 0 792 0 0 cm /Im1 Do Q").with_resources(resources)]
    });
    let session = Session::open_bytes_with_options(data, options).unwrap();
    let image = session.render_page(0).unwrap();

    assert_eq!(pixel(&image, 1000, 1000), [0, 0, 0, 255]);
    // 16 decoded bytes do not fit a 4 byte budget.
    assert!(session.context().store().is_empty());
}

#[test]
fn test_document_info() {
    let data = build_pdf(vec![
        TestPage::letter(""),
        TestPage::letter("").rotated(270),
    ]);
    let session = Session::open_bytes(data).unwrap();
    let info = session.info().unwrap();

    assert_eq!(info.page_count, 2);
    assert!(!info.needs_password);
    assert_eq!(info.pages[0].pixel_width(), 2550);
    assert_eq!(info.pages[1].pixel_width(), 3300);

    let json = info.to_json().unwrap();
    assert!(json.contains("\"handler\": \"pdf\""));
}
