//! Extraction path
//!
//! Loads an image, runs the engine in the mode's output contract and, for
//! text+images mode, post-processes the bounding boxes. All methods block.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use super::bbox;
use super::provider::InferenceEngine;
use super::types::{OcrError, OcrMode};

/// Output of one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Markdown text, image references already rewritten
    pub text: String,
    /// `(old_ref, saved_filename)` pairs, empty in text-only mode
    pub images: Vec<(String, String)>,
}

impl Extraction {
    /// Saved image filenames in reference order
    pub fn image_names(&self) -> Vec<String> {
        self.images.iter().map(|(_, name)| name.clone()).collect()
    }
}

/// Runs the engine against image files
#[derive(Clone)]
pub struct Extractor {
    engine: Arc<dyn InferenceEngine>,
}

impl Extractor {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    /// Dispatch on mode. `output_dir` and `prefix` are only used for
    /// text+images.
    pub fn extract(
        &self,
        mode: OcrMode,
        image_path: &Path,
        output_dir: &Path,
        prefix: &str,
        device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<Extraction, OcrError> {
        match mode {
            OcrMode::TextOnly => Ok(Extraction {
                text: self.extract_text_only(image_path, device, on_fragment)?,
                images: Vec::new(),
            }),
            OcrMode::TextWithImages => {
                self.extract_text_with_images(image_path, output_dir, prefix, device, on_fragment)
            }
        }
    }

    /// Plain markdown text
    pub fn extract_text_only(
        &self,
        image_path: &Path,
        device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<String, OcrError> {
        let image = load_image(image_path)?;
        let data = encode_png(&image)?;
        self.engine.generate(&data, OcrMode::TextOnly, device, on_fragment)
    }

    /// Markdown text plus cropped regions saved into `output_dir`
    pub fn extract_text_with_images(
        &self,
        image_path: &Path,
        output_dir: &Path,
        prefix: &str,
        device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<Extraction, OcrError> {
        let image = load_image(image_path)?;
        let data = encode_png(&image)?;
        let raw = self
            .engine
            .generate(&data, OcrMode::TextWithImages, device, on_fragment)?;

        let (cleaned, boxes) = bbox::parse_markers(&raw);
        tracing::debug!(path = %image_path.display(), boxes = boxes.len(), "Parsed bbox output");

        if boxes.is_empty() {
            return Ok(Extraction { text: cleaned, images: Vec::new() });
        }

        let images = bbox::extract_regions(&image, &boxes, output_dir, prefix)?;
        Ok(Extraction {
            text: bbox::rewrite_refs(&cleaned, &images),
            images,
        })
    }
}

/// Open an image, normalized to RGB
pub fn load_image(path: &Path) -> Result<DynamicImage, OcrError> {
    let image = image::open(path).map_err(|e| OcrError::ImageLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut output = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::provider::ScriptedEngine;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 200, 200]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_text_only() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "scan.png", 10, 10);
        let extractor = Extractor::new(Arc::new(ScriptedEngine::new("Hello world")));

        let mut fragments = Vec::new();
        let text = extractor
            .extract_text_only(&path, "cpu", &mut |f| fragments.push(f.to_string()))
            .unwrap();

        assert_eq!(text, "Hello world");
        assert_eq!(fragments.concat(), "Hello world");
    }

    #[test]
    fn test_text_with_images_rewrites_references() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "scan.png", 400, 200);
        let out = dir.path().join("results");
        let engine = ScriptedEngine::new("")
            .then_reply("Intro\n![image](image_1.png)0,0,500,500\nOutro");
        let extractor = Extractor::new(Arc::new(engine));

        let extraction = extractor
            .extract_text_with_images(&path, &out, "scan_", "auto", &mut |_| {})
            .unwrap();

        assert_eq!(extraction.text, "Intro\n![image](scan_image_1.png)\nOutro");
        assert_eq!(extraction.image_names(), vec!["scan_image_1.png"]);
        let crop = image::open(out.join("scan_image_1.png")).unwrap();
        assert_eq!((crop.width(), crop.height()), (200, 100));
    }

    #[test]
    fn test_missing_image_is_load_error() {
        let dir = TempDir::new().unwrap();
        let extractor = Extractor::new(Arc::new(ScriptedEngine::new("x")));
        let result = extractor.extract(
            OcrMode::TextOnly,
            &dir.path().join("nope.png"),
            dir.path(),
            "",
            "cpu",
            &mut |_| {},
        );
        assert!(matches!(result, Err(OcrError::ImageLoad { .. })));
    }
}
