//! Progress-callback trait for per-page flatten events.
//!
//! Inject an [`Arc<dyn FlattenProgress>`] via
//! [`crate::config::FlattenConfigBuilder::progress_callback`] to receive
//! events as the transform works through the document. The CLI drives its
//! progress bar from these; the library itself only logs.
//!
//! # Example
//!
//! ```rust
//! use pdf_flatten::{FlattenConfig, FlattenProgress};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     flattened: AtomicUsize,
//! }
//!
//! impl FlattenProgress for CountingCallback {
//!     fn on_page_flattened(&self, page_num: usize, total_pages: usize, _w: u32, _h: u32) {
//!         self.flattened.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done", page_num, total_pages);
//!     }
//! }
//!
//! let config = FlattenConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { flattened: AtomicUsize::new(0) }))
//!     .build();
//! ```

use std::sync::Arc;

/// Called by the flatten transform as it processes each page.
///
/// Implementations must be `Send + Sync`: the server runs flatten calls on
/// Tokio's blocking pool. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait FlattenProgress: Send + Sync {
    /// Called once the source document has been parsed.
    ///
    /// # Arguments
    /// * `total_pages`: number of pages that will be flattened
    fn on_document_loaded(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been rasterised and appended to the output.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the document
    /// * `width_px`, `height_px`: size of the embedded raster
    fn on_page_flattened(&self, page_num: usize, total_pages: usize, width_px: u32, height_px: u32) {
        let _ = (page_num, total_pages, width_px, height_px);
    }

    /// Called once after the output document has been serialised.
    fn on_complete(&self, total_pages: usize, output_bytes: usize) {
        let _ = (total_pages, output_bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl FlattenProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::FlattenConfig`].
pub type ProgressCallback = Arc<dyn FlattenProgress>;
