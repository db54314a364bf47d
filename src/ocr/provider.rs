//! Inference Engines
//!
//! Defines the engine trait consumed by the extraction path and the Ollama
//! implementation that streams generated text from a local model server.

use std::io::{BufRead, BufReader};

use async_trait::async_trait;
use serde::Deserialize;

use super::types::{OcrError, OcrMode};
use crate::config::OcrConfig;

/// Inference engine trait
///
/// `generate` is blocking and compute-bound. Callers run it on a worker
/// thread, never on the async executor.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Engine name for logs and system info
    fn name(&self) -> &str;

    /// Check if the engine is reachable
    async fn is_available(&self) -> bool;

    /// Run the model on an encoded image, reporting each decoded fragment
    /// through `on_fragment` as it arrives. Returns the full output.
    fn generate(
        &self,
        image_data: &[u8],
        mode: OcrMode,
        device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<String, OcrError>;
}

/// Ollama-served OCR model
pub struct OllamaEngine {
    config: OcrConfig,
}

/// One line of Ollama's NDJSON stream
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn model_for(&self, mode: OcrMode) -> &str {
        match mode {
            OcrMode::TextOnly => &self.config.text_model,
            OcrMode::TextWithImages => &self.config.bbox_model,
        }
    }

    fn request_body(&self, image_data: &[u8], mode: OcrMode, device: &str) -> serde_json::Value {
        use base64::Engine;

        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let mut options = serde_json::json!({
            "num_predict": self.config.max_new_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        });
        // Ollama has no device switch; CPU is forced by offloading zero layers
        if device.eq_ignore_ascii_case("cpu") {
            options["num_gpu"] = serde_json::json!(0);
        }

        serde_json::json!({
            "model": self.model_for(mode),
            "prompt": "",
            "images": [image_base64],
            "stream": true,
            "options": options,
        })
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        let client = reqwest::Client::new();
        let url = format!("{}/api/tags", self.config.endpoint);

        match client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn generate(
        &self,
        image_data: &[u8],
        mode: OcrMode,
        device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<String, OcrError> {
        // The blocking client owns a runtime of its own, so it is built here
        // on the worker thread rather than stored on the engine
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| OcrError::Request(e.to_string()))?;
        let url = format!("{}/api/generate", self.config.endpoint);

        tracing::debug!(model = self.model_for(mode), device, "Starting generation");

        let response = client
            .post(&url)
            .json(&self.request_body(image_data, mode, device))
            .send()
            .map_err(|e| OcrError::Request(format!("Failed to call Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(OcrError::Engine(format!("Ollama returned {}: {}", status, body)));
        }

        let mut output = String::new();
        for line in BufReader::new(response).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateChunk = serde_json::from_str(&line)
                .map_err(|e| OcrError::MalformedResponse(e.to_string()))?;
            if let Some(error) = chunk.error {
                return Err(OcrError::Engine(error));
            }
            if !chunk.response.is_empty() {
                on_fragment(&chunk.response);
                output.push_str(&chunk.response);
            }
            if chunk.done {
                break;
            }
        }

        Ok(output)
    }
}

/// Engine replaying canned outputs, for tests
#[cfg(test)]
pub struct ScriptedEngine {
    replies: parking_lot::Mutex<std::collections::VecDeque<Result<String, String>>>,
    fallback: String,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedEngine {
    /// Every call returns `fallback` unless a scripted reply is queued
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: parking_lot::Mutex::new(Default::default()),
            fallback: fallback.to_string(),
            calls: Default::default(),
        }
    }

    pub fn then_reply(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.replies.lock().push_back(Err(message.to_string()));
        self
    }
}

#[cfg(test)]
#[async_trait]
impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn generate(
        &self,
        _image_data: &[u8],
        _mode: OcrMode,
        _device: &str,
        on_fragment: &mut dyn FnMut(&str),
    ) -> Result<String, OcrError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));

        let text = reply.map_err(OcrError::Engine)?;
        for fragment in text.split_inclusive(' ') {
            on_fragment(fragment);
        }
        Ok(text)
    }
}
