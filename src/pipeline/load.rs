//! Document loading: opaque bytes → parsed [`SourceDocument`].
//!
//! Two cheap checks run before the engine sees the buffer: an empty payload
//! is rejected outright, and so is a buffer with no `%PDF-` header in its
//! first kilobyte (readers tolerate some leading junk, so the header is not
//! required at offset 0). Both surface as input errors, like any parse
//! failure the engine reports.

use crate::document::{RenderBackend, SourceDocument};
use crate::error::FlattenError;
use tracing::{debug, info};

/// How far into the buffer the `%PDF-` header may start.
const HEADER_SEARCH_WINDOW: usize = 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Parse `bytes` with `backend`.
///
/// The returned document borrows both the backend and the input; dropping it
/// releases the engine's parse context.
pub fn load<'a, B: RenderBackend>(
    backend: &'a B,
    bytes: &'a [u8],
) -> Result<B::Source<'a>, FlattenError> {
    if bytes.is_empty() {
        return Err(FlattenError::EmptyInput);
    }

    let Some(offset) = find_pdf_header(bytes) else {
        return Err(FlattenError::NotAPdf {
            magic: bytes.iter().take(8).copied().collect(),
        });
    };
    if offset > 0 {
        debug!("PDF header found at byte offset {}", offset);
    }

    let document = backend.open_source(bytes)?;
    let page_count = document.page_count();
    if page_count == 0 {
        return Err(FlattenError::MalformedDocument {
            detail: "document has no pages".into(),
        });
    }

    info!("PDF loaded: {} pages, {} bytes", page_count, bytes.len());
    Ok(document)
}

/// Byte offset of the `%PDF-` header within the search window, if present.
pub fn find_pdf_header(bytes: &[u8]) -> Option<usize> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
}
