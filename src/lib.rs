//! Scriptorium Server
//!
//! Sequential OCR job server. Uploaded images and PDFs are grouped into jobs,
//! run one at a time through a vision-language model, and streamed back to
//! connected clients as incremental text over a WebSocket push channel.

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod ocr;
pub mod pages;
pub mod pdf;
pub mod queue;
pub mod routes;
pub mod state;
pub mod storage;
