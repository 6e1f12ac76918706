//! # pdf-flatten
//!
//! Flatten PDF documents: every page is rasterised and re-embedded as a
//! single full-page image, so form fields, annotations, layers and text
//! become plain pixels. Page count, order and sizes are preserved.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Load         open with pdfium (empty / non-PDF / corrupt → InvalidInput)
//!  ├─ 2. Rasterise    per page: points × DPI / 72 pixels, opaque RGB, PNG
//!  ├─ 3. Reassemble   new page of the same size, image drawn edge to edge
//!  └─ 4. Serialise    compressed PDF bytes
//! ```
//!
//! Any failure aborts the whole document; no partial output is returned and
//! every engine handle is released before the error reaches the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_flatten::{flatten, Dpi};
//!
//! let input = std::fs::read("form.pdf")?;
//! let flat = flatten(&input, Dpi::new(200)?)?;
//! std::fs::write("form.flattened.pdf", flat)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | `pdf-flatten` binary (clap + indicatif + tracing-subscriber) |
//! | `server` | on      | `pdf-flatten-server` binary and the [`server`] module (axum) |
//!
//! Library-only users can drop both:
//! ```toml
//! pdf-flatten = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod files;
pub mod flatten;
pub mod pdfium;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Dpi, FlattenConfig, FlattenConfigBuilder, InvalidDpi};
pub use document::{
    ImageRect, OutputDocument, PageSize, RasterImage, RenderBackend, RenderRequest, SourceDocument,
};
pub use error::{ErrorKind, FlattenError};
pub use flatten::{flatten, flatten_async, FlattenOutput, FlattenService, FlattenStats, Flattener};
pub use pdfium::{PdfiumBackend, PdfiumService};
pub use progress::{FlattenProgress, NoopProgress, ProgressCallback};
