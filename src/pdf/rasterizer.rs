//! PDF rasterization using MuPDF

use std::path::Path;

use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix};
use thiserror::Error;

use crate::pages::PageSelection;

/// Rasterization errors
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Failed to load PDF: {0}")]
    LoadError(String),
    #[error("Failed to render page {page}: {message}")]
    RenderError { page: usize, message: String },
    #[error("Image conversion error: {0}")]
    ImageError(String),
    #[error("MuPDF error: {0}")]
    MuPdfError(String),
}

impl From<mupdf::Error> for RasterError {
    fn from(e: mupdf::Error) -> Self {
        RasterError::MuPdfError(e.to_string())
    }
}

/// Turns PDF pages into images. Blocking.
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self, path: &Path) -> Result<usize, RasterError>;

    /// Render the selected pages as `(0-indexed page, image)` pairs in page
    /// order. Selected pages past the end of the document are skipped.
    fn render(
        &self,
        path: &Path,
        selection: &PageSelection,
    ) -> Result<Vec<(usize, DynamicImage)>, RasterError>;
}

/// MuPDF-backed rasterizer
#[derive(Debug, Clone)]
pub struct MuPdfRasterizer {
    dpi: u32,
}

impl MuPdfRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }

    /// Render scale relative to PDF points (72 per inch)
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }

    fn open(path: &Path) -> Result<Document, RasterError> {
        let path_str = path.to_string_lossy();
        Document::open(&*path_str).map_err(|e| RasterError::LoadError(e.to_string()))
    }
}

impl Rasterizer for MuPdfRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, RasterError> {
        let doc = Self::open(path)?;
        Ok(doc.page_count()? as usize)
    }

    fn render(
        &self,
        path: &Path,
        selection: &PageSelection,
    ) -> Result<Vec<(usize, DynamicImage)>, RasterError> {
        let doc = Self::open(path)?;
        let page_count = doc.page_count()? as usize;
        let indices = selection.resolve(page_count);

        tracing::debug!(
            path = %path.display(),
            page_count,
            selected = indices.len(),
            dpi = self.dpi,
            "Rasterizing PDF"
        );

        let matrix = Matrix::new_scale(self.scale(), self.scale());
        let colorspace = Colorspace::device_rgb();

        let mut pages = Vec::with_capacity(indices.len());
        for index in indices {
            let page = doc.load_page(index as i32).map_err(|e| RasterError::RenderError {
                page: index + 1,
                message: e.to_string(),
            })?;
            let pixmap = page
                .to_pixmap(&matrix, &colorspace, false, true)
                .map_err(|e| RasterError::RenderError {
                    page: index + 1,
                    message: e.to_string(),
                })?;
            pages.push((index, pixmap_to_image(&pixmap)?));
        }

        Ok(pages)
    }
}

/// Copy pixmap samples into an RGB image
fn pixmap_to_image(pixmap: &mupdf::Pixmap) -> Result<DynamicImage, RasterError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize; // components per pixel

    let mut rgb_buffer = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            rgb_buffer.extend_from_slice(&[r, g, b]);
        }
    }

    let img = RgbImage::from_raw(width, height, rgb_buffer)
        .ok_or_else(|| RasterError::ImageError("Failed to create image buffer".to_string()))?;
    Ok(DynamicImage::ImageRgb8(img))
}

/// Rasterizer producing blank pages, for tests
#[cfg(test)]
pub struct BlankRasterizer {
    pub pages: usize,
    pub fail: bool,
}

#[cfg(test)]
impl BlankRasterizer {
    pub fn with_pages(pages: usize) -> Self {
        Self { pages, fail: false }
    }

    pub fn failing() -> Self {
        Self { pages: 0, fail: true }
    }
}

#[cfg(test)]
impl Rasterizer for BlankRasterizer {
    fn page_count(&self, _path: &Path) -> Result<usize, RasterError> {
        if self.fail {
            return Err(RasterError::LoadError("corrupt document".to_string()));
        }
        Ok(self.pages)
    }

    fn render(
        &self,
        path: &Path,
        selection: &PageSelection,
    ) -> Result<Vec<(usize, DynamicImage)>, RasterError> {
        let count = self.page_count(path)?;
        Ok(selection
            .resolve(count)
            .into_iter()
            .map(|i| (i, DynamicImage::ImageRgb8(RgbImage::new(40, 60))))
            .collect())
    }
}
