//! Memory stability across many open/render/close cycles.

mod common;

use common::{build_pdf, TestPage};
use peak_alloc::PeakAlloc;
use rasterpage::Session;

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

const CYCLES: usize = 1000;

#[test]
fn test_repeated_sessions_do_not_grow_memory() {
    // A 1in square page keeps each render at 300x300 pixels.
    let data = build_pdf(vec![TestPage::sized(
        [0, 0, 72, 72],
        "0 0 1 rg 10 10 50 50 re f 2 w 0 0 m 72 72 l S",
    )]);

    // Warm up lazily initialised state (logger, allocator pools).
    for _ in 0..10 {
        let session = Session::open_bytes(data.as_slice()).unwrap();
        session.render_page(0).unwrap();
        session.close().unwrap();
    }

    let baseline = PEAK_ALLOC.current_usage();
    for _ in 0..CYCLES {
        let session = Session::open_bytes(data.as_slice()).unwrap();
        let image = session.render_page(0).unwrap();
        assert_eq!(image.dimensions(), (300, 300));
        drop(image);
        session.close().unwrap();
    }
    let after = PEAK_ALLOC.current_usage();

    let growth = after.saturating_sub(baseline);
    assert!(
        growth < 256 * 1024,
        "memory grew by {} bytes over {} cycles",
        growth,
        CYCLES
    );
}
