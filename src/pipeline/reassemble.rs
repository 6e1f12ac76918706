//! Page reassembly: stamp rasters onto fresh pages and serialise the result.
//!
//! Each output page copies its source page's size in points verbatim and
//! holds one image covering the whole page rectangle. The raster was produced
//! with a uniform scale, so stretching it to the page is aspect-preserving.

use crate::document::{OutputDocument, PageSize, RasterImage};
use crate::error::FlattenError;
use tracing::debug;

/// Append a page of `size` to `output` whose only content is `raster`.
///
/// `page_num` (1-indexed) is only used for error reporting.
pub fn append_page<O: OutputDocument>(
    output: &mut O,
    page_num: usize,
    size: PageSize,
    raster: &RasterImage,
) -> Result<(), FlattenError> {
    let image = raster.decode().map_err(|e| FlattenError::RenderFailed {
        page: page_num,
        detail: format!("raster could not be decoded for embedding: {e}"),
    })?;

    output.push_image_page(size, size.full_page_rect(), &image)?;
    debug!(
        "Appended page {} ({} x {} pt) with {}x{} px image",
        page_num,
        size.width,
        size.height,
        raster.width(),
        raster.height()
    );
    Ok(())
}

/// Write the finished document to a single byte buffer.
///
/// Takes the document by value: once serialised it cannot be modified.
pub fn serialize<O: OutputDocument>(output: O) -> Result<Vec<u8>, FlattenError> {
    let pages = output.page_count();
    let bytes = output.save()?;
    if bytes.is_empty() {
        return Err(FlattenError::SerializationFailed {
            detail: "engine produced an empty document".into(),
        });
    }
    debug!("Serialised {} pages → {} bytes", pages, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dpi;
    use crate::document::ImageRect;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

    /// Records pages; `save` returns whatever `saved` holds.
    struct Recorder {
        pages: Vec<(PageSize, ImageRect, (u32, u32))>,
        saved: Vec<u8>,
    }

    impl OutputDocument for Recorder {
        fn push_image_page(
            &mut self,
            size: PageSize,
            rect: ImageRect,
            image: &DynamicImage,
        ) -> Result<(), FlattenError> {
            self.pages.push((size, rect, image.dimensions()));
            Ok(())
        }

        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn save(self) -> Result<Vec<u8>, FlattenError> {
            Ok(self.saved)
        }
    }

    fn raster(width: u32, height: u32) -> RasterImage {
        let pixels = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        RasterImage::encode(&pixels, Dpi::MIN).unwrap()
    }

    #[test]
    fn image_covers_the_whole_page() {
        let mut out = Recorder {
            pages: Vec::new(),
            saved: Vec::new(),
        };
        let size = PageSize::new(300.0, 200.0);

        append_page(&mut out, 1, size, &raster(300, 200)).unwrap();

        assert_eq!(out.pages.len(), 1);
        let (page_size, rect, pixels) = out.pages[0];
        assert_eq!(page_size, size);
        assert_eq!(
            rect,
            ImageRect {
                x: 0.0,
                y: 0.0,
                width: 300.0,
                height: 200.0
            }
        );
        assert_eq!(pixels, (300, 200));
    }

    #[test]
    fn empty_serialisation_is_an_error() {
        let out = Recorder {
            pages: Vec::new(),
            saved: Vec::new(),
        };
        let err = serialize(out).unwrap_err();
        assert!(matches!(err, FlattenError::SerializationFailed { .. }));
    }

    #[test]
    fn serialised_bytes_are_returned_unchanged() {
        let out = Recorder {
            pages: Vec::new(),
            saved: b"%PDF-1.7 body".to_vec(),
        };
        assert_eq!(serialize(out).unwrap(), b"%PDF-1.7 body");
    }
}
