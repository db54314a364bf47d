//! Storage
//!
//! Job metadata (`JobStore`) and the per-job file layout (`FileStore`).

mod file_store;
mod job_store;

pub use file_store::{safe_file_name, FileStore};
pub use job_store::{JobStore, JsonJobStore, CARDS_FILE};

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode job store: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}
