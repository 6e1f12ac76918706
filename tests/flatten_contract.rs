//! Behavioural tests of the flatten transform against an in-memory engine.
//!
//! The mock backend records every render request and every output page, and
//! counts live engine handles so the tests can check that nothing leaks on
//! any exit path.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use pdf_flatten::{
    Dpi, ErrorKind, FlattenConfig, FlattenError, FlattenProgress, Flattener, ImageRect,
    OutputDocument, PageSize, RenderBackend, RenderRequest, SourceDocument,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PDF: &[u8] = b"%PDF-1.7\n% mock document\n";

// ── Mock engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct PushedPage {
    size: PageSize,
    rect: ImageRect,
    pixels: (u32, u32),
}

#[derive(Default)]
struct Ledger {
    live_handles: AtomicUsize,
    opened: AtomicUsize,
    renders: Mutex<Vec<(usize, RenderRequest)>>,
    pushed: Mutex<Vec<PushedPage>>,
}

impl Ledger {
    fn live(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    fn render_sizes(&self) -> Vec<(u32, u32)> {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| (r.width_px, r.height_px))
            .collect()
    }

    fn pushed(&self) -> Vec<PushedPage> {
        self.pushed.lock().unwrap().clone()
    }
}

/// A live engine resource. Dropping it is the release.
struct Handle(Arc<Ledger>);

impl Handle {
    fn acquire(ledger: &Arc<Ledger>) -> Self {
        ledger.live_handles.fetch_add(1, Ordering::SeqCst);
        ledger.opened.fetch_add(1, Ordering::SeqCst);
        Handle(Arc::clone(ledger))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.0.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockBackend {
    pages: Vec<PageSize>,
    reject_open: bool,
    fail_render_at: Option<usize>,
    fail_save: bool,
    ledger: Arc<Ledger>,
}

impl MockBackend {
    fn with_pages(pages: &[PageSize]) -> Self {
        Self {
            pages: pages.to_vec(),
            ..Self::default()
        }
    }
}

struct MockSource<'a> {
    backend: &'a MockBackend,
    _handle: Handle,
}

struct MockOutput<'a> {
    backend: &'a MockBackend,
    pages: usize,
    _handle: Handle,
}

impl RenderBackend for MockBackend {
    type Source<'a> = MockSource<'a>;
    type Output<'a> = MockOutput<'a>;

    fn open_source<'a>(&'a self, _bytes: &'a [u8]) -> Result<MockSource<'a>, FlattenError> {
        if self.reject_open {
            return Err(FlattenError::MalformedDocument {
                detail: "xref table is missing".into(),
            });
        }
        Ok(MockSource {
            backend: self,
            _handle: Handle::acquire(&self.ledger),
        })
    }

    fn create_output(&self) -> Result<MockOutput<'_>, FlattenError> {
        Ok(MockOutput {
            backend: self,
            pages: 0,
            _handle: Handle::acquire(&self.ledger),
        })
    }
}

impl SourceDocument for MockSource<'_> {
    fn page_count(&self) -> usize {
        self.backend.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize, FlattenError> {
        Ok(self.backend.pages[index])
    }

    fn render_page(&self, index: usize, request: &RenderRequest) -> Result<RgbImage, FlattenError> {
        self.backend
            .ledger
            .renders
            .lock()
            .unwrap()
            .push((index, *request));

        if self.backend.fail_render_at == Some(index) {
            return Err(FlattenError::RenderFailed {
                page: index + 1,
                detail: "engine out of memory".into(),
            });
        }

        // Shade encodes the page index so reordering would be visible.
        let shade = (index * 40) as u8;
        Ok(RgbImage::from_pixel(
            request.width_px,
            request.height_px,
            Rgb([shade, 255 - shade, 128]),
        ))
    }
}

impl OutputDocument for MockOutput<'_> {
    fn push_image_page(
        &mut self,
        size: PageSize,
        rect: ImageRect,
        image: &DynamicImage,
    ) -> Result<(), FlattenError> {
        self.backend.ledger.pushed.lock().unwrap().push(PushedPage {
            size,
            rect,
            pixels: image.dimensions(),
        });
        self.pages += 1;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn save(self) -> Result<Vec<u8>, FlattenError> {
        if self.backend.fail_save {
            return Err(FlattenError::SerializationFailed {
                detail: "disk full".into(),
            });
        }
        let mut out = b"%PDF-1.7\n".to_vec();
        for page in self.backend.ledger.pushed() {
            out.extend_from_slice(
                format!(
                    "{} {} {} {}\n",
                    page.size.width, page.size.height, page.pixels.0, page.pixels.1
                )
                .as_bytes(),
            );
        }
        Ok(out)
    }
}

fn dpi(value: u32) -> Dpi {
    Dpi::new(value).unwrap()
}

// ── Page structure ───────────────────────────────────────────────────────────

#[test]
fn letter_and_a4_at_150_dpi() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER, PageSize::A4]);
    let ledger = Arc::clone(&backend.ledger);

    let output = Flattener::new(backend).run(PDF, dpi(150)).unwrap();

    assert_eq!(output.stats.page_count, 2);
    assert_eq!(output.stats.dpi, 150);
    assert!(output.pdf.starts_with(b"%PDF"));
    assert_eq!(ledger.render_sizes(), vec![(1275, 1650), (1240, 1754)]);

    let pushed = ledger.pushed();
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[0].size, PageSize::LETTER);
    assert_eq!(pushed[1].size, PageSize::A4);
    assert_eq!(pushed[0].pixels, (1275, 1650));
    assert_eq!(pushed[1].pixels, (1240, 1754));
}

#[test]
fn every_image_covers_its_whole_page() {
    let sizes = [PageSize::A4, PageSize::new(300.0, 200.0), PageSize::LETTER];
    let backend = MockBackend::with_pages(&sizes);
    let ledger = Arc::clone(&backend.ledger);

    Flattener::new(backend).flatten(PDF, dpi(72)).unwrap();

    let pushed = ledger.pushed();
    assert_eq!(pushed.len(), sizes.len());
    for (page, size) in pushed.iter().zip(sizes) {
        assert_eq!(page.size, size);
        assert_eq!(page.rect, size.full_page_rect());
    }
}

#[test]
fn pages_are_rendered_in_source_order() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER; 4]);
    let ledger = Arc::clone(&backend.ledger);

    Flattener::new(backend).flatten(PDF, dpi(72)).unwrap();

    let order: Vec<usize> = ledger.renders.lock().unwrap().iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn doubling_dpi_doubles_raster_dimensions() {
    let low = MockBackend::with_pages(&[PageSize::LETTER]);
    let high = MockBackend::with_pages(&[PageSize::LETTER]);
    let (low_ledger, high_ledger) = (Arc::clone(&low.ledger), Arc::clone(&high.ledger));

    Flattener::new(low).flatten(PDF, dpi(72)).unwrap();
    Flattener::new(high).flatten(PDF, dpi(144)).unwrap();

    assert_eq!(low_ledger.render_sizes(), vec![(612, 792)]);
    assert_eq!(high_ledger.render_sizes(), vec![(1224, 1584)]);
}

#[test]
fn same_input_gives_same_output() {
    let run = || {
        Flattener::new(MockBackend::with_pages(&[PageSize::A4, PageSize::LETTER]))
            .flatten(PDF, dpi(96))
            .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn annotation_setting_reaches_the_renderer() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER]);
    let ledger = Arc::clone(&backend.ledger);
    let config = FlattenConfig::builder().render_annotations(false).build();

    Flattener::with_config(backend, config)
        .flatten(PDF, dpi(72))
        .unwrap();

    let renders = ledger.renders.lock().unwrap();
    assert!(!renders[0].1.render_annotations);
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[test]
fn empty_input_is_rejected_before_the_engine_runs() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER]);
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(b"", dpi(150)).unwrap_err();

    assert!(matches!(err, FlattenError::EmptyInput));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn non_pdf_bytes_are_invalid_input() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER]);
    let err = Flattener::new(backend)
        .flatten(b"PK\x03\x04 this is a zip file", dpi(150))
        .unwrap_err();

    assert!(matches!(err, FlattenError::NotAPdf { .. }));
    assert!(err.is_invalid_input());
}

#[test]
fn unparsable_document_is_invalid_input() {
    let backend = MockBackend {
        reject_open: true,
        ..MockBackend::with_pages(&[PageSize::LETTER])
    };
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, dpi(150)).unwrap_err();

    assert!(matches!(err, FlattenError::MalformedDocument { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn document_without_pages_is_invalid_input() {
    let backend = MockBackend::with_pages(&[]);
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, dpi(150)).unwrap_err();

    assert!(matches!(err, FlattenError::MalformedDocument { .. }));
    assert_eq!(ledger.live(), 0);
}

#[test]
fn zero_area_page_is_invalid_input() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER, PageSize::new(0.0, 792.0)]);
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, dpi(72)).unwrap_err();

    assert!(matches!(err, FlattenError::DegeneratePage { page: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn oversized_page_fails_before_rendering() {
    // 2000 pt square at 600 DPI is roughly 278 megapixels.
    let backend = MockBackend::with_pages(&[PageSize::LETTER, PageSize::new(2000.0, 2000.0)]);
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, Dpi::MAX).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RenderFailure);
    assert_eq!(err.page(), Some(2));
    assert_eq!(ledger.renders.lock().unwrap().len(), 1);
    assert_eq!(ledger.live(), 0);
}

// ── Transform errors and resource release ───────────────────────────────────

#[test]
fn render_failure_aborts_the_document() {
    let backend = MockBackend {
        fail_render_at: Some(1),
        ..MockBackend::with_pages(&[PageSize::LETTER; 3])
    };
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, dpi(72)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RenderFailure);
    assert_eq!(err.page(), Some(2));
    // Page 3 is never attempted.
    assert_eq!(ledger.renders.lock().unwrap().len(), 2);
    assert_eq!(ledger.pushed().len(), 1);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn serialization_failure_is_reported() {
    let backend = MockBackend {
        fail_save: true,
        ..MockBackend::with_pages(&[PageSize::LETTER])
    };
    let ledger = Arc::clone(&backend.ledger);

    let err = Flattener::new(backend).flatten(PDF, dpi(72)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SerializationFailure);
    assert_eq!(ledger.live(), 0);
}

#[test]
fn all_handles_are_released_after_success() {
    let backend = MockBackend::with_pages(&[PageSize::LETTER, PageSize::A4]);
    let ledger = Arc::clone(&backend.ledger);

    Flattener::new(backend).flatten(PDF, dpi(72)).unwrap();

    // One source and one output document were opened, and both are closed.
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.live(), 0);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl FlattenProgress for Recorder {
    fn on_document_loaded(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("loaded {total_pages}"));
    }

    fn on_page_flattened(&self, page_num: usize, total_pages: usize, width_px: u32, height_px: u32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("page {page_num}/{total_pages} {width_px}x{height_px}"));
    }

    fn on_complete(&self, total_pages: usize, _output_bytes: usize) {
        self.events.lock().unwrap().push(format!("done {total_pages}"));
    }
}

#[test]
fn progress_events_follow_the_pages() {
    let recorder = Arc::new(Recorder::default());
    let config = FlattenConfig::builder()
        .progress_callback(recorder.clone())
        .build();

    Flattener::with_config(
        MockBackend::with_pages(&[PageSize::LETTER, PageSize::new(144.0, 72.0)]),
        config,
    )
    .flatten(PDF, dpi(72))
    .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "loaded 2".to_string(),
            "page 1/2 612x792".to_string(),
            "page 2/2 144x72".to_string(),
            "done 2".to_string(),
        ]
    );
}

#[test]
fn failed_run_never_reports_completion() {
    let recorder = Arc::new(Recorder::default());
    let config = FlattenConfig::builder()
        .progress_callback(recorder.clone())
        .build();
    let backend = MockBackend {
        fail_render_at: Some(0),
        ..MockBackend::with_pages(&[PageSize::LETTER])
    };

    assert!(Flattener::with_config(backend, config)
        .flatten(PDF, dpi(72))
        .is_err());

    let events = recorder.events.lock().unwrap();
    assert_eq!(*events, vec!["loaded 1".to_string()]);
}
