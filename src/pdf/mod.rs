//! PDF Module
//!
//! Rasterizes selected PDF pages for the extraction path. Rendering runs
//! at the configured DPI (scale = dpi / 72).

mod rasterizer;

pub use rasterizer::{MuPdfRasterizer, RasterError, Rasterizer};

#[cfg(test)]
pub use rasterizer::BlankRasterizer;
