//! Document model and the rendering-engine seam.
//!
//! The flatten pipeline never talks to pdfium directly. It drives three small
//! traits instead:
//!
//! * [`RenderBackend`] opens source documents and creates empty output
//!   documents;
//! * [`SourceDocument`] exposes page geometry and renders a page to opaque
//!   pixels;
//! * [`OutputDocument`] accepts full-page images and serialises itself once.
//!
//! Documents are owned values. Dropping one releases every engine resource
//! behind it, which is how every exit path of a flatten call (including `?`
//! early returns) releases what it acquired.

use crate::config::Dpi;
use crate::error::FlattenError;
use image::{DynamicImage, RgbImage};
use serde::Serialize;

/// Physical page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter, 612 x 792 pt.
    pub const LETTER: PageSize = PageSize::new(612.0, 792.0);

    /// ISO A4, 595 x 842 pt (rounded to whole points).
    pub const A4: PageSize = PageSize::new(595.0, 842.0);

    /// `true` when either side is zero, negative, NaN or infinite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Compare two sizes within `tolerance` points on each axis.
    pub fn approx_eq(&self, other: &PageSize, tolerance: f32) -> bool {
        (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }

    /// The rectangle an embedded page image must cover: the whole page,
    /// anchored at the page origin.
    pub fn full_page_rect(&self) -> ImageRect {
        ImageRect {
            x: 0.0,
            y: 0.0,
            width: self.width,
            height: self.height,
        }
    }
}

/// Placement of an image on a page, in points from the bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// What the rasteriser asks a backend to draw for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    /// Exact output width in pixels. Always ≥ 1.
    pub width_px: u32,
    /// Exact output height in pixels. Always ≥ 1.
    pub height_px: u32,
    /// Draw annotations (including form widgets) into the image.
    pub render_annotations: bool,
}

/// A rasterised page, PNG-encoded for transport into the reassembly stage.
///
/// The pixel grid never carries an alpha channel: pages are rendered onto an
/// opaque white background and converted to RGB before encoding.
#[derive(Debug, Clone)]
pub struct RasterImage {
    width: u32,
    height: u32,
    dpi: Dpi,
    png: Vec<u8>,
}

impl RasterImage {
    /// Encode an opaque pixel grid as lossless PNG.
    pub fn encode(pixels: &RgbImage, dpi: Dpi) -> Result<Self, image::ImageError> {
        let mut png = Vec::new();
        pixels.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
        Ok(Self {
            width: pixels.width(),
            height: pixels.height(),
            dpi,
            png,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Density the page was rendered at.
    pub fn dpi(&self) -> Dpi {
        self.dpi
    }

    /// The encoded PNG bytes.
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Decode back into a pixel grid for embedding.
    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        image::load_from_memory_with_format(&self.png, image::ImageFormat::Png)
    }
}

/// A rendering engine able to read PDFs and write new ones.
///
/// Documents borrow the backend (and the input bytes), so a document can never
/// outlive the engine binding that produced it.
pub trait RenderBackend {
    type Source<'a>: SourceDocument
    where
        Self: 'a;
    type Output<'a>: OutputDocument
    where
        Self: 'a;

    /// Parse `bytes` into a source document.
    ///
    /// Parse failures must map to an input error
    /// ([`FlattenError::MalformedDocument`] or
    /// [`FlattenError::PasswordRequired`]), never to an internal one.
    fn open_source<'a>(&'a self, bytes: &'a [u8]) -> Result<Self::Source<'a>, FlattenError>;

    /// Create a new, empty output document.
    fn create_output(&self) -> Result<Self::Output<'_>, FlattenError>;
}

/// Read-only view of a parsed input document.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Displayed size of page `index` (0-based), in points.
    fn page_size(&self, index: usize) -> Result<PageSize, FlattenError>;

    /// Render page `index` (0-based) to an opaque pixel grid of exactly
    /// `request.width_px` x `request.height_px`.
    fn render_page(&self, index: usize, request: &RenderRequest)
        -> Result<RgbImage, FlattenError>;
}

/// A document under construction.
pub trait OutputDocument {
    /// Append a page of `size` points whose only content is `image`, placed
    /// over `rect`.
    fn push_image_page(
        &mut self,
        size: PageSize,
        rect: ImageRect,
        image: &DynamicImage,
    ) -> Result<(), FlattenError>;

    fn page_count(&self) -> usize;

    /// Write the finished document to bytes. Consumes the document.
    fn save(self) -> Result<Vec<u8>, FlattenError>;
}
