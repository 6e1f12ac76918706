//! Flatten orchestration: load → (rasterize → append) per page → serialize.
//!
//! ## Failure contract
//!
//! The first error from any stage aborts the whole call; no partial document
//! is ever returned. Every engine resource is an owned value
//! (source document, output document, per-page rasters) so an early `?`
//! return drops, and therefore releases, everything acquired so far before
//! the error reaches the caller. Rasters are dropped at the end of each loop
//! iteration, so only one page's buffers are alive at a time; their size is
//! capped by [`rasterize::MAX_PAGE_PIXELS`].
//!
//! ## Why synchronous?
//!
//! pdfium is CPU-bound and not async-safe. The transform itself is a plain
//! blocking function; [`flatten_async`] moves it onto Tokio's blocking pool
//! for async callers such as the HTTP service.

use crate::config::{Dpi, FlattenConfig};
use crate::document::{RenderBackend, SourceDocument};
use crate::error::FlattenError;
use crate::pdfium::PdfiumBackend;
use crate::pipeline::{load, rasterize, reassemble};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A flattened PDF plus statistics about the run.
#[derive(Debug, Clone)]
pub struct FlattenOutput {
    pub pdf: Vec<u8>,
    pub stats: FlattenStats,
}

/// Statistics for one flatten run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenStats {
    pub page_count: usize,
    pub dpi: u32,
    pub input_bytes: usize,
    pub output_bytes: usize,
    /// Time spent rasterising and embedding pages.
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Runs the flatten transform on a [`RenderBackend`].
pub struct Flattener<B> {
    backend: B,
    config: FlattenConfig,
}

impl<B: RenderBackend> Flattener<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, FlattenConfig::default())
    }

    pub fn with_config(backend: B, config: FlattenConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Flatten `bytes` at `dpi` and return the new PDF.
    pub fn flatten(&self, bytes: &[u8], dpi: Dpi) -> Result<Vec<u8>, FlattenError> {
        self.run(bytes, dpi).map(|output| output.pdf)
    }

    /// Flatten `bytes` at `dpi`, returning the PDF together with run stats.
    pub fn run(&self, bytes: &[u8], dpi: Dpi) -> Result<FlattenOutput, FlattenError> {
        let total_start = Instant::now();

        // ── Step 1: Load ─────────────────────────────────────────────────
        let source = load::load(&self.backend, bytes)?;
        let total_pages = source.page_count();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_loaded(total_pages);
        }

        // ── Step 2: Rasterise + reassemble, page by page ─────────────────
        let render_start = Instant::now();
        let mut output = self.backend.create_output()?;

        for index in 0..total_pages {
            let page_num = index + 1;
            let (size, raster) =
                rasterize::rasterize(&source, index, dpi, self.config.render_annotations)?;
            reassemble::append_page(&mut output, page_num, size, &raster)?;

            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_flattened(page_num, total_pages, raster.width(), raster.height());
            }
        }
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        // The source is no longer needed; release it before serialising.
        drop(source);

        // ── Step 3: Serialise ────────────────────────────────────────────
        let pdf = reassemble::serialize(output)?;

        let stats = FlattenStats {
            page_count: total_pages,
            dpi: dpi.get(),
            input_bytes: bytes.len(),
            output_bytes: pdf.len(),
            render_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Flatten complete: {} pages at {} DPI, {} → {} bytes, {}ms total",
            stats.page_count, stats.dpi, stats.input_bytes, stats.output_bytes,
            stats.total_duration_ms
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_complete(total_pages, pdf.len());
        }

        Ok(FlattenOutput { pdf, stats })
    }
}

/// A flatten transform that can be shared across threads.
///
/// This is the seam the HTTP service depends on: production uses
/// [`crate::pdfium::PdfiumService`], tests plug in doubles.
pub trait FlattenService: Send + Sync {
    fn flatten(&self, bytes: &[u8], dpi: Dpi) -> Result<FlattenOutput, FlattenError>;
}

/// Run `service` on Tokio's blocking thread pool.
///
/// A panic inside the transform is reported as [`FlattenError::Internal`].
pub async fn flatten_async(
    service: Arc<dyn FlattenService>,
    bytes: Vec<u8>,
    dpi: Dpi,
) -> Result<FlattenOutput, FlattenError> {
    tokio::task::spawn_blocking(move || service.flatten(&bytes, dpi))
        .await
        .map_err(|e| {
            warn!("Flatten task failed to complete: {}", e);
            FlattenError::Internal(format!("Flatten task panicked: {}", e))
        })?
}

/// Flatten `bytes` at `dpi` with a freshly bound pdfium.
///
/// Convenient for one-shot use. Long-running callers should bind once via
/// [`Flattener::new`] with a [`PdfiumBackend`], or use
/// [`crate::pdfium::PdfiumService`].
///
/// # Example
/// ```rust,no_run
/// use pdf_flatten::{flatten, Dpi};
///
/// let input = std::fs::read("form.pdf")?;
/// let flat = flatten(&input, Dpi::DEFAULT)?;
/// std::fs::write("form.flattened.pdf", flat)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn flatten(bytes: &[u8], dpi: Dpi) -> Result<Vec<u8>, FlattenError> {
    if bytes.is_empty() {
        return Err(FlattenError::EmptyInput);
    }
    Flattener::new(PdfiumBackend::bind()?).flatten(bytes, dpi)
}
