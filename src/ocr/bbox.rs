//! Bounding-box post-processing
//!
//! The bbox model interleaves its markdown with markers such as
//! `![image](image_1.png)120,40,880,410`, where the four integers are corner
//! coordinates normalized to `[0, 1000]`. This module strips the coordinates,
//! crops each region out of the source image and points the references at
//! the saved crops.

use std::path::Path;
use std::sync::LazyLock;

use image::DynamicImage;
use regex::{Captures, Regex};

use super::types::{OcrError, PixelRect};

/// Upper bound of the normalized coordinate space
pub const BBOX_COORD_MAX: u64 = 1000;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[image\]\(([^)]+)\)\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)")
        .expect("bbox marker pattern is valid")
});

/// A region reported by the model, in normalized coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    pub image_ref: String,
    pub x1: u64,
    pub y1: u64,
    pub x2: u64,
    pub y2: u64,
}

impl BoundingBox {
    /// Scale normalized coordinates to pixels: `n * dimension / 1000`
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let scale = |n: u64, dim: u32| -> u32 {
            u32::try_from(n.saturating_mul(dim as u64) / BBOX_COORD_MAX).unwrap_or(u32::MAX)
        };
        PixelRect {
            x1: scale(self.x1, width),
            y1: scale(self.y1, height),
            x2: scale(self.x2, width),
            y2: scale(self.y2, height),
        }
    }
}

/// Strip coordinates from every marker in one pass.
///
/// Returns the cleaned text and the boxes in marker order.
pub fn parse_markers(raw: &str) -> (String, Vec<BoundingBox>) {
    let mut boxes = Vec::new();

    let cleaned = MARKER.replace_all(raw, |caps: &Captures| {
        let image_ref = caps[1].to_string();
        let coord = |i: usize| caps[i].parse::<u64>().unwrap_or(u64::MAX);
        boxes.push(BoundingBox {
            image_ref: image_ref.clone(),
            x1: coord(2),
            y1: coord(3),
            x2: coord(4),
            y2: coord(5),
        });
        format!("![image]({})", image_ref)
    });

    (cleaned.into_owned(), boxes)
}

/// Crop every box out of `source` and save it as `{prefix}image_{n}.png`.
///
/// Returns `(old_ref, new_filename)` pairs in first-seen order. A reference
/// repeated by several markers maps to the last crop saved for it.
pub fn extract_regions(
    source: &DynamicImage,
    boxes: &[BoundingBox],
    output_dir: &Path,
    prefix: &str,
) -> Result<Vec<(String, String)>, OcrError> {
    std::fs::create_dir_all(output_dir)?;

    let (width, height) = (source.width(), source.height());
    let mut mapping: Vec<(String, String)> = Vec::new();

    for (i, bbox) in boxes.iter().enumerate() {
        let rect = match bbox.to_pixels(width, height).clamp_to(width, height) {
            Some(rect) => rect,
            None => {
                tracing::warn!(
                    image_ref = %bbox.image_ref,
                    "Skipping bounding box with no area inside a {}x{} image",
                    width,
                    height
                );
                continue;
            }
        };

        let filename = format!("{}image_{}.png", prefix, i + 1);
        let path = output_dir.join(&filename);
        source
            .crop_imm(rect.x1, rect.y1, rect.width(), rect.height())
            .save(&path)
            .map_err(|e| OcrError::ImageSave {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        match mapping.iter_mut().find(|(old, _)| *old == bbox.image_ref) {
            Some(entry) => entry.1 = filename,
            None => mapping.push((bbox.image_ref.clone(), filename)),
        }
    }

    Ok(mapping)
}

/// Point every occurrence of an old reference at its saved crop.
///
/// One pass over the text: a new filename is never matched against the
/// other old references. Longer references win where one contains another.
pub fn rewrite_refs(text: &str, mapping: &[(String, String)]) -> String {
    if mapping.is_empty() {
        return text.to_string();
    }

    let mut olds: Vec<&str> = mapping.iter().map(|(old, _)| old.as_str()).collect();
    olds.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let pattern = olds
        .iter()
        .map(|old| regex::escape(old))
        .collect::<Vec<_>>()
        .join("|");

    let refs = match Regex::new(&pattern) {
        Ok(refs) => refs,
        Err(e) => {
            tracing::warn!("Leaving image references as generated: {}", e);
            return text.to_string();
        }
    };

    refs.replace_all(text, |caps: &Captures| {
        let found = &caps[0];
        mapping
            .iter()
            .find(|(old, _)| old == found)
            .map(|(_, new)| new.clone())
            .unwrap_or_else(|| found.to_string())
    })
    .into_owned()
}
