//! Benchmarks for page rendering.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lopdf::{dictionary, Document, Object, Stream};
use rasterpage::Session;

/// Creates a synthetic PDF with `page_count` Letter pages of vector content.
fn create_test_pdf(page_count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..page_count {
        let mut content = String::new();
        for row in 0..20 {
            content.push_str(&format!(
                "{} {} {} rg {} {} 500 20 re f\n",
                (row % 3) as f32 / 2.0,
                (i % 2) as f32,
                0.5,
                50 + row * 2,
                50 + row * 35
            ));
        }
        content.push_str("2 w 0 0 0 RG 50 50 m 560 740 l 560 50 l h S\n");

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Benchmark opening documents from memory.
fn bench_open(c: &mut Criterion) {
    let small = create_test_pdf(1);
    let large = create_test_pdf(50);

    c.bench_function("open_1_page", |b| {
        b.iter(|| Session::open_bytes(black_box(small.as_slice())).unwrap());
    });

    c.bench_function("open_50_pages", |b| {
        b.iter(|| Session::open_bytes(black_box(large.as_slice())).unwrap());
    });
}

/// Benchmark rendering a Letter page at 300 DPI.
fn bench_render(c: &mut Criterion) {
    let data = create_test_pdf(1);
    let session = Session::open_bytes(data.as_slice()).unwrap();

    let mut group = c.benchmark_group("render");
    group.sample_size(20);
    group.bench_function("letter_300dpi", |b| {
        b.iter(|| session.render_page(black_box(0)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_open, bench_render);
criterion_main!(benches);
