//! Page rasterisation: one [`SourceDocument`] page → [`RasterImage`].
//!
//! ## Geometry
//!
//! A page of `w × h` points rendered at `dpi` becomes a pixel grid of
//! `round(w · dpi/72) × round(h · dpi/72)`. The same scale applies to both
//! axes, so the raster keeps the page's aspect ratio and the reassembler can
//! stretch it over the destination page without distortion. Sub-pixel pages
//! are clamped to 1 px per side so the grid is never empty.
//!
//! ## Why PNG?
//!
//! The pixel grid is handed to the reassembler as a lossless PNG. JPEG
//! artefacts around rendered text are exactly what a "printed" copy should
//! not introduce.

use crate::config::Dpi;
use crate::document::{PageSize, RasterImage, RenderRequest, SourceDocument};
use crate::error::FlattenError;
use tracing::debug;

/// Largest raster, in pixels, a single page may be drawn to.
///
/// A page passes through several full-size buffers between the engine and
/// the output document (engine bitmap, RGB grid, PNG decode, embed buffer),
/// so this bounds the per-page working set to a few GiB. A3 at 600 DPI is
/// about 70 megapixels.
pub const MAX_PAGE_PIXELS: u64 = 100_000_000;

/// Pixel dimensions of `size` rendered at `dpi`.
///
/// Returns `None` when the result does not fit the engine's `i32` pixel
/// coordinates or exceeds [`MAX_PAGE_PIXELS`].
pub fn raster_dimensions(size: PageSize, dpi: Dpi) -> Option<(u32, u32)> {
    let scale = dpi.scale();
    let px = |points: f32| -> Option<u32> {
        let v = (points * scale).round().max(1.0);
        (v < i32::MAX as f32).then_some(v as u32)
    };
    let (width, height) = (px(size.width)?, px(size.height)?);
    (u64::from(width) * u64::from(height) <= MAX_PAGE_PIXELS).then_some((width, height))
}

/// Rasterise page `index` (0-based) of `document`.
///
/// Fails with [`FlattenError::DegeneratePage`] for zero-area pages and with
/// [`FlattenError::RenderFailed`] when the engine cannot draw the page.
pub fn rasterize<S: SourceDocument>(
    document: &S,
    index: usize,
    dpi: Dpi,
    render_annotations: bool,
) -> Result<(PageSize, RasterImage), FlattenError> {
    let page_num = index + 1;
    let size = document.page_size(index)?;

    if size.is_degenerate() {
        return Err(FlattenError::DegeneratePage {
            page: page_num,
            width: size.width,
            height: size.height,
        });
    }

    let (width_px, height_px) =
        raster_dimensions(size, dpi).ok_or_else(|| FlattenError::RenderFailed {
            page: page_num,
            detail: format!(
                "{} x {} pt at {} DPI exceeds the {} pixel page limit",
                size.width, size.height, dpi, MAX_PAGE_PIXELS
            ),
        })?;

    let request = RenderRequest {
        width_px,
        height_px,
        render_annotations,
    };
    let pixels = document.render_page(index, &request)?;

    if (pixels.width(), pixels.height()) != (width_px, height_px) {
        return Err(FlattenError::RenderFailed {
            page: page_num,
            detail: format!(
                "renderer produced {}x{} px, expected {}x{}",
                pixels.width(),
                pixels.height(),
                width_px,
                height_px
            ),
        });
    }

    let raster = RasterImage::encode(&pixels, dpi).map_err(|e| FlattenError::RenderFailed {
        page: page_num,
        detail: format!("PNG encoding failed: {e}"),
    })?;

    debug!(
        "Rendered page {} ({} x {} pt) at {} DPI → {}x{} px, {} bytes PNG",
        page_num,
        size.width,
        size.height,
        raster.dpi(),
        width_px,
        height_px,
        raster.png_bytes().len()
    );

    Ok((size, raster))
}
