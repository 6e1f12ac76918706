//! Configuration types for PDF flattening.
//!
//! Rendering density is carried by [`Dpi`], a newtype that can only hold a
//! value inside the supported range. The core transform takes a `Dpi` on
//! every call and never picks one itself: default selection and range
//! validation happen once, at the boundary that parses user input.
//!
//! Everything else that shapes a flatten run lives in [`FlattenConfig`],
//! built via its [`FlattenConfigBuilder`].

use crate::progress::{FlattenProgress, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Rasterisation density in samples per inch (72 PDF points).
///
/// Range: 72–600. Default: 150.
///
/// 150 DPI keeps body text legible when printed while a Letter page stays
/// around 2 megapixels. 300 is print quality; 600 is the ceiling because an
/// A3 page at that density already needs close to 200 MB of raw pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Dpi(u32);

/// A density outside [`Dpi::MIN`]..=[`Dpi::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("DPI must be {}–{}, got {value}", Dpi::MIN.0, Dpi::MAX.0)]
pub struct InvalidDpi {
    pub value: u32,
}

impl Dpi {
    pub const MIN: Dpi = Dpi(72);
    pub const MAX: Dpi = Dpi(600);
    pub const DEFAULT: Dpi = Dpi(150);

    /// Validate a raw DPI value.
    pub fn new(value: u32) -> Result<Self, InvalidDpi> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Dpi(value))
        } else {
            Err(InvalidDpi { value })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Pixels per PDF point at this density.
    pub fn scale(self) -> f32 {
        self.0 as f32 / 72.0
    }
}

impl Default for Dpi {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Dpi {
    type Error = InvalidDpi;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Dpi::new(value)
    }
}

impl From<Dpi> for u32 {
    fn from(dpi: Dpi) -> Self {
        dpi.0
    }
}

impl fmt::Display for Dpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for a flatten run.
///
/// Built via [`FlattenConfig::builder()`] or using
/// [`FlattenConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_flatten::FlattenConfig;
///
/// let config = FlattenConfig::builder()
///     .render_annotations(false)
///     .build();
/// assert!(!config.render_annotations);
/// ```
#[derive(Clone)]
pub struct FlattenConfig {
    /// Draw annotations and form-field widgets into the page image. Default: true.
    ///
    /// Filled-in form values only exist as widget annotations; skipping them
    /// would flatten a completed form back to a blank one.
    pub render_annotations: bool,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            render_annotations: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FlattenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenConfig")
            .field("render_annotations", &self.render_annotations)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn FlattenProgress>"),
            )
            .finish()
    }
}

impl FlattenConfig {
    /// Create a new builder for `FlattenConfig`.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FlattenConfig`].
#[derive(Debug)]
pub struct FlattenConfigBuilder {
    config: FlattenConfig,
}

impl FlattenConfigBuilder {
    pub fn render_annotations(mut self, v: bool) -> Self {
        self.config.render_annotations = v;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn FlattenProgress>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> FlattenConfig {
        self.config
    }
}
