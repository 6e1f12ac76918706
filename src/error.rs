//! Error types for the pdf-flatten library.
//!
//! A single fatal error type, [`FlattenError`], covers every way a flatten
//! call can fail. There is no page-level "soft" error: a partially flattened
//! PDF is worse than an explicit failure, so the first failing page aborts the
//! whole document.
//!
//! Each variant classifies into an [`ErrorKind`]. The HTTP boundary maps the
//! kind, not the variant, to a status code. That keeps the rule "user input
//! is never blamed for an internal bug" in one place.

use serde::Serialize;
use thiserror::Error;

/// All errors returned by the flatten transform.
#[derive(Debug, Error)]
pub enum FlattenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input buffer was empty.
    #[error("Empty payload: no PDF bytes were supplied")]
    EmptyInput,

    /// No `%PDF-` header was found near the start of the buffer.
    #[error("Input is not a PDF document (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// The PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Invalid or corrupted PDF: {detail}")]
    MalformedDocument { detail: String },

    /// The document is encrypted and cannot be opened without a password.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A page has zero, negative or non-finite dimensions.
    #[error("Page {page} has degenerate geometry ({width} x {height} pt)")]
    DegeneratePage { page: usize, width: f32, height: f32 },

    // ── Transform errors ──────────────────────────────────────────────────
    /// The rendering engine failed on a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The assembled output document could not be written.
    #[error("Failed to serialise flattened PDF: {detail}")]
    SerializationFailed { detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`FlattenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty, unparsable or otherwise unusable input. Always the caller's fault.
    InvalidInput,
    /// A page could not be rasterised.
    RenderFailure,
    /// The output document could not be written.
    SerializationFailure,
    /// Anything else. Never attributed to the caller's input.
    Internal,
}

impl FlattenError {
    /// Classify this error for the boundary layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlattenError::EmptyInput
            | FlattenError::NotAPdf { .. }
            | FlattenError::MalformedDocument { .. }
            | FlattenError::PasswordRequired
            | FlattenError::DegeneratePage { .. } => ErrorKind::InvalidInput,
            FlattenError::RenderFailed { .. } => ErrorKind::RenderFailure,
            FlattenError::SerializationFailed { .. } => ErrorKind::SerializationFailure,
            FlattenError::PdfiumBindingFailed(_) | FlattenError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// `true` when the failure is attributable to the supplied document.
    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }

    /// The 1-indexed page the error refers to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            FlattenError::RenderFailed { page, .. } | FlattenError::DegeneratePage { page, .. } => {
                Some(*page)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_classify_as_invalid_input() {
        assert_eq!(FlattenError::EmptyInput.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            FlattenError::MalformedDocument {
                detail: "xref".into()
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            FlattenError::NotAPdf {
                magic: b"GIF8".to_vec()
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert!(FlattenError::PasswordRequired.is_invalid_input());
    }

    #[test]
    fn internal_errors_are_never_invalid_input() {
        assert_eq!(
            FlattenError::Internal("boom".into()).kind(),
            ErrorKind::Internal
        );
        assert!(!FlattenError::PdfiumBindingFailed("missing".into()).is_invalid_input());
    }

    #[test]
    fn render_failure_display_names_page() {
        let e = FlattenError::RenderFailed {
            page: 3,
            detail: "bad content stream".into(),
        };
        assert_eq!(e.kind(), ErrorKind::RenderFailure);
        assert_eq!(e.page(), Some(3));
        assert!(e.to_string().contains("page 3"), "got: {e}");
    }

    #[test]
    fn degenerate_page_display() {
        let e = FlattenError::DegeneratePage {
            page: 2,
            width: 0.0,
            height: 792.0,
        };
        assert!(e.to_string().contains("Page 2"));
        assert!(e.to_string().contains("792"));
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SerializationFailure).unwrap();
        assert_eq!(json, "\"serialization_failure\"");
    }
}
