//! OCR Types

use serde::{Deserialize, Serialize};

/// Extraction mode, fixed per job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OcrMode {
    /// Plain markdown text
    #[default]
    #[serde(rename = "text", alias = "text-only")]
    TextOnly,
    /// Markdown text plus image regions cropped from model-reported boxes
    #[serde(rename = "img", alias = "text-img")]
    TextWithImages,
}

impl OcrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::TextOnly => "text",
            OcrMode::TextWithImages => "img",
        }
    }

    /// Whether this mode produces cropped image regions
    pub fn extracts_images(&self) -> bool {
        matches!(self, OcrMode::TextWithImages)
    }
}

impl std::fmt::Display for OcrMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OcrMode {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text-only" | "text_only" => Ok(OcrMode::TextOnly),
            "img" | "text-img" | "text_img" => Ok(OcrMode::TextWithImages),
            other => Err(OcrError::InvalidMode(other.to_string())),
        }
    }
}

/// Pixel-space rectangle given by its corners (`x2`/`y2` exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Clamp to an image of the given size.
    ///
    /// Returns `None` when nothing of the rectangle is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let clamped = PixelRect {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        };
        if clamped.width() == 0 || clamped.height() == 0 {
            None
        } else {
            Some(clamped)
        }
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to load image {path}: {message}")]
    ImageLoad { path: String, message: String },

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    #[error("Failed to save image region {path}: {message}")]
    ImageSave { path: String, message: String },

    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Inference engine returned an error: {0}")]
    Engine(String),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Inference worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),

    #[error("Unknown OCR mode: {0}")]
    InvalidMode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
