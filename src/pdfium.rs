//! pdfium implementation of the [`crate::document`] traits.
//!
//! ## Binding
//!
//! [`PdfiumBackend::bind`] loads the platform pdfium library through
//! `pdfium-provision`, downloading it into the user cache on first use. The
//! binding is an ordinary value: there is no process-wide engine singleton in
//! this crate, and every document borrows the backend that opened it.
//!
//! ## Thread safety
//!
//! pdfium is not reentrant and keeps process-global state between
//! initialisation and teardown. A [`PdfiumBackend`] is therefore used from one
//! thread at a time, and long-running processes bind once:
//! [`PdfiumService`] confines a single backend to an engine thread and feeds
//! it jobs over a channel.

use crate::config::{Dpi, FlattenConfig};
use crate::document::{
    ImageRect, OutputDocument, PageSize, RenderBackend, RenderRequest, SourceDocument,
};
use crate::error::FlattenError;
use crate::flatten::{FlattenOutput, FlattenService, Flattener};
use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, error, info};

/// A bound pdfium library.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to pdfium, downloading and caching the library if necessary.
    pub fn bind() -> Result<Self, FlattenError> {
        let pdfium = pdfium_provision::bind_default()
            .map_err(|e| FlattenError::PdfiumBindingFailed(e.to_string()))?;
        Ok(Self { pdfium })
    }

    /// Bind to the pdfium library at an explicit `path`.
    pub fn bind_from_path(path: &Path) -> Result<Self, FlattenError> {
        let pdfium = pdfium_provision::bind(path)
            .map_err(|e| FlattenError::PdfiumBindingFailed(e.to_string()))?;
        Ok(Self { pdfium })
    }

    /// Wrap an already bound [`Pdfium`].
    pub fn from_pdfium(pdfium: Pdfium) -> Self {
        Self { pdfium }
    }

    pub fn pdfium(&self) -> &Pdfium {
        &self.pdfium
    }
}

impl RenderBackend for PdfiumBackend {
    type Source<'a>
        = PdfiumSource<'a>
    where
        Self: 'a;
    type Output<'a>
        = PdfiumOutput<'a>
    where
        Self: 'a;

    fn open_source<'a>(&'a self, bytes: &'a [u8]) -> Result<PdfiumSource<'a>, FlattenError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(classify_load_error)?;
        Ok(PdfiumSource { document })
    }

    fn create_output(&self) -> Result<PdfiumOutput<'_>, FlattenError> {
        let document = self.pdfium.create_new_pdf().map_err(|e| {
            FlattenError::Internal(format!("could not create output document: {:?}", e))
        })?;
        Ok(PdfiumOutput { document })
    }
}

/// Map a pdfium open failure to an input error.
///
/// Anything pdfium refuses to open is the caller's document's fault; only the
/// password case gets its own variant.
fn classify_load_error(e: PdfiumError) -> FlattenError {
    match e {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            FlattenError::PasswordRequired
        }
        other => FlattenError::MalformedDocument {
            detail: format!("{:?}", other),
        },
    }
}

fn page_index(index: usize) -> Result<PdfPageIndex, FlattenError> {
    PdfPageIndex::try_from(index).map_err(|_| FlattenError::RenderFailed {
        page: index + 1,
        detail: "page index exceeds pdfium's page range".into(),
    })
}

/// A PDF parsed by pdfium. Dropping it closes the pdfium document.
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

impl SourceDocument for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, FlattenError> {
        let page = self
            .document
            .pages()
            .get(page_index(index)?)
            .map_err(|e| FlattenError::RenderFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })?;
        // pdfium reports the displayed size, i.e. after /Rotate is applied.
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn render_page(
        &self,
        index: usize,
        request: &RenderRequest,
    ) -> Result<RgbImage, FlattenError> {
        let render_failed = |e: PdfiumError| FlattenError::RenderFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        };

        let page = self
            .document
            .pages()
            .get(page_index(index)?)
            .map_err(render_failed)?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(request.width_px as i32)
            .set_target_height(request.height_px as i32)
            .set_format(PdfBitmapFormat::BGR)
            .set_clear_color(PdfColor::WHITE)
            .render_annotations(request.render_annotations)
            .render_form_data(request.render_annotations);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(render_failed)?;

        // A BGR bitmap has no alpha; pdfium composites onto the clear colour.
        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let image = rgba_to_rgb(width, height, &bitmap.as_rgba_bytes()).ok_or_else(|| {
            FlattenError::RenderFailed {
                page: index + 1,
                detail: format!("pdfium returned a short buffer for {width}x{height} px"),
            }
        })?;
        debug!(
            "pdfium rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// A new PDF being assembled by pdfium. Dropping it closes the document.
pub struct PdfiumOutput<'a> {
    document: PdfDocument<'a>,
}

impl OutputDocument for PdfiumOutput<'_> {
    fn push_image_page(
        &mut self,
        size: PageSize,
        rect: ImageRect,
        image: &DynamicImage,
    ) -> Result<(), FlattenError> {
        let page_num = self.page_count() + 1;
        let embed_failed = |e: PdfiumError| {
            FlattenError::Internal(format!("embedding page {page_num} failed: {:?}", e))
        };

        let pixels = match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        };
        let (width, height) = match (
            Pixels::try_from(pixels.width()),
            Pixels::try_from(pixels.height()),
        ) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(FlattenError::Internal(format!(
                    "page {page_num} raster exceeds pdfium's bitmap size"
                )))
            }
        };

        let mut buffer = to_bgr_rows(&pixels);
        drop(pixels);

        // SAFETY: `buffer` holds `height` rows of `bgr_stride(width)` bytes,
        // the pitch pdfium derives for a BGR bitmap, and outlives `bitmap`.
        let bitmap = unsafe {
            PdfBitmap::from_bytes(
                width,
                height,
                PdfBitmapFormat::BGR,
                &mut buffer,
                self.document.bindings(),
            )
        }
        .map_err(embed_failed)?;

        // An image object built from a bitmap without alpha gets no /SMask.
        let mut object = PdfPageImageObject::new(&self.document).map_err(embed_failed)?;
        object.set_bitmap(&bitmap).map_err(embed_failed)?;
        drop(bitmap);
        drop(buffer);

        object.scale(rect.width, rect.height).map_err(embed_failed)?;
        object
            .translate(PdfPoints::new(rect.x), PdfPoints::new(rect.y))
            .map_err(embed_failed)?;

        let mut page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(size.width),
                PdfPoints::new(size.height),
            ))
            .map_err(embed_failed)?;
        page.objects_mut()
            .add_image_object(object)
            .map_err(embed_failed)?;

        Ok(())
    }

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn save(self) -> Result<Vec<u8>, FlattenError> {
        // pdfium Flate-compresses the image streams it writes.
        self.document
            .save_to_bytes()
            .map_err(|e| FlattenError::SerializationFailed {
                detail: format!("{:?}", e),
            })
    }
}

/// Bytes per row of a 24-bit pdfium bitmap: 3 per pixel, padded to 4.
fn bgr_stride(width: u32) -> usize {
    (width as usize * 3 + 3) & !3
}

/// Pack an RGB grid into pdfium's row-padded BGR layout.
fn to_bgr_rows(pixels: &RgbImage) -> Vec<u8> {
    let stride = bgr_stride(pixels.width());
    let mut buffer = vec![0u8; stride * pixels.height() as usize];
    for (row, out) in pixels.rows().zip(buffer.chunks_exact_mut(stride)) {
        for (pixel, bgr) in row.zip(out.chunks_exact_mut(3)) {
            let [r, g, b] = pixel.0;
            bgr.copy_from_slice(&[b, g, r]);
        }
    }
    buffer
}

/// Drop the (opaque) alpha byte of packed RGBA pixels.
fn rgba_to_rgb(width: u32, height: u32, rgba: &[u8]) -> Option<RgbImage> {
    let rgb = rgba
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();
    RgbImage::from_raw(width, height, rgb)
}

/// One queued request for the engine thread.
struct Job {
    bytes: Vec<u8>,
    dpi: Dpi,
    reply: mpsc::SyncSender<Result<FlattenOutput, FlattenError>>,
}

/// Thread-shareable flatten service backed by pdfium.
///
/// pdfium is bound exactly once, on a dedicated engine thread that owns the
/// [`PdfiumBackend`] for the lifetime of the service. Callers on any thread
/// queue jobs and block until theirs is done; documents are flattened one at
/// a time, in arrival order. Dropping the service stops the thread and
/// unbinds pdfium once the queue has drained.
pub struct PdfiumService {
    library: PathBuf,
    jobs: mpsc::Sender<Job>,
}

impl PdfiumService {
    /// Resolve (and download if necessary) the pdfium library, then start
    /// the engine.
    pub fn new(config: FlattenConfig) -> Result<Self, FlattenError> {
        let library = pdfium_provision::ensure_library(None)
            .map_err(|e| FlattenError::PdfiumBindingFailed(e.to_string()))?;
        Self::start(library, config)
    }

    /// Start the engine on the pdfium library at `library`.
    ///
    /// Returns once the library is bound, so a bad path fails here rather
    /// than on the first request.
    pub fn start(library: PathBuf, config: FlattenConfig) -> Result<Self, FlattenError> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let path = library.clone();

        thread::Builder::new()
            .name("pdfium-engine".into())
            .spawn(move || {
                let backend = match PdfiumBackend::bind_from_path(&path) {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_engine(Flattener::with_config(backend, config), queue);
            })
            .map_err(|e| FlattenError::Internal(format!("could not start engine thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| FlattenError::Internal("engine thread exited during startup".into()))??;
        info!("pdfium engine bound from {}", library.display());

        Ok(Self { library, jobs })
    }

    pub fn library_path(&self) -> &Path {
        &self.library
    }
}

/// Serve `queue` until every sender is gone. A panic inside one job is
/// reported to that job's caller and the loop carries on with the next.
fn run_engine<B: RenderBackend>(flattener: Flattener<B>, queue: mpsc::Receiver<Job>) {
    for job in queue {
        let result = panic::catch_unwind(AssertUnwindSafe(|| flattener.run(&job.bytes, job.dpi)))
            .unwrap_or_else(|_| {
                error!("engine panicked while flattening a document");
                Err(FlattenError::Internal("flatten panicked".into()))
            });
        // The caller may have given up (timeout); the result is dropped then.
        let _ = job.reply.send(result);
    }
    debug!("pdfium engine thread stopped");
}

impl FlattenService for PdfiumService {
    fn flatten(&self, bytes: &[u8], dpi: Dpi) -> Result<FlattenOutput, FlattenError> {
        let (reply, response) = mpsc::sync_channel(1);
        self.jobs
            .send(Job {
                bytes: bytes.to_vec(),
                dpi,
                reply,
            })
            .map_err(|_| FlattenError::Internal("pdfium engine thread has stopped".into()))?;
        response
            .recv()
            .map_err(|_| FlattenError::Internal("pdfium engine dropped the request".into()))?
    }
}
