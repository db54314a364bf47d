//! Configuration management for Scriptorium

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body limit for uploads, in megabytes
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root for `cards.json` and the per-job `files/` and `results/` folders
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Inference engine base URL
    pub endpoint: String,
    /// Model used in text-only mode
    pub text_model: String,
    /// Model used in text+images mode
    pub bbox_model: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Device used when a job does not name one
    pub default_device: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    pub render_dpi: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_mb: 200,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            endpoint: "http://localhost:11434".to_string(),
            text_model: "lightonocr-2-1b".to_string(),
            bbox_model: "lightonocr-2-1b-bbox".to_string(),
            max_new_tokens: 4096,
            temperature: 0.2,
            top_p: 0.9,
            default_device: "auto".to_string(),
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        PdfConfig { render_dpi: 200 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            ocr: OcrConfig::default(),
            pdf: PdfConfig::default(),
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Config {
            server: ServerConfig {
                host: text("SERVER_HOST", &defaults.server.host),
                port: parse_or(&lookup, "SERVER_PORT", defaults.server.port),
                max_upload_mb: parse_or(&lookup, "MAX_UPLOAD_MB", defaults.server.max_upload_mb),
            },
            storage: StorageConfig {
                output_dir: lookup("OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.output_dir),
            },
            ocr: OcrConfig {
                endpoint: text("OCR_ENDPOINT", &defaults.ocr.endpoint)
                    .trim_end_matches('/')
                    .to_string(),
                text_model: text("OCR_MODEL_TEXT", &defaults.ocr.text_model),
                bbox_model: text("OCR_MODEL_BBOX", &defaults.ocr.bbox_model),
                max_new_tokens: parse_or(&lookup, "OCR_MAX_NEW_TOKENS", defaults.ocr.max_new_tokens),
                temperature: parse_or(&lookup, "OCR_TEMPERATURE", defaults.ocr.temperature),
                top_p: parse_or(&lookup, "OCR_TOP_P", defaults.ocr.top_p),
                default_device: text("OCR_DEFAULT_DEVICE", &defaults.ocr.default_device),
            },
            pdf: PdfConfig {
                render_dpi: parse_or(&lookup, "PDF_RENDER_DPI", defaults.pdf.render_dpi),
            },
        }
    }

    /// Upload body limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value {:?} for {}, using default {}", raw, key, default);
            default
        }),
    }
}
