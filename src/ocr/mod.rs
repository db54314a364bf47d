//! OCR Module
//!
//! Turns page images into markdown through a vision-language model.
//!
//! - `provider`: the inference engine trait and the Ollama-backed engine
//! - `extractor`: text-only and text+images extraction over an engine
//! - `bbox`: bounding-box marker parsing, cropping and reference rewriting
//! - `stream`: bridges the blocking generation call to `ocr_chunk` events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scriptorium_server::ocr::{Extractor, OcrMode, OllamaEngine, StreamBridge};
//!
//! let extractor = Extractor::new(Arc::new(OllamaEngine::new(config.ocr.clone())));
//! let bridge = StreamBridge::new(broadcaster, &job_id, &file_id, None);
//!
//! let extraction = bridge
//!     .run(move |on_fragment| {
//!         extractor.extract(OcrMode::TextOnly, &path, &out_dir, "", "auto", on_fragment)
//!     })
//!     .await??;
//! ```

pub mod bbox;
mod extractor;
mod provider;
mod stream;
mod types;

pub use extractor::{load_image, Extraction, Extractor};
pub use provider::{InferenceEngine, OllamaEngine};
pub use stream::StreamBridge;
pub use types::{OcrError, OcrMode, PixelRect};

#[cfg(test)]
pub use provider::ScriptedEngine;
