//! Pipeline stages of the flatten transform.
//!
//! Each submodule implements exactly one step and is generic over the
//! [`crate::document`] traits, so every stage can be exercised without a
//! real rendering engine.
//!
//! ## Data Flow
//!
//! ```text
//! load ──▶ rasterize ──▶ reassemble ──▶ serialize
//! (bytes)   (per page)    (per page)     (bytes)
//! ```
//!
//! 1. [`load`]      : reject empty/non-PDF payloads, parse the document
//! 2. [`rasterize`] : draw one page to an opaque pixel grid at the requested
//!    density and PNG-encode it
//! 3. [`reassemble`]: create a same-sized page in the output document and
//!    cover it with the raster; finally serialise the output once

pub mod load;
pub mod rasterize;
pub mod reassemble;
