//! Job execution errors

use thiserror::Error;

use crate::ocr::OcrError;
use crate::pdf::RasterError;
use crate::storage::StoreError;

/// Failures while executing a job.
///
/// Everything but `Store` and `Unexpected` is caught per file and recorded
/// as a failed file; those two end the whole job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Input file missing: {0}")]
    InputMissing(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] OcrError),

    #[error("Rasterization failed: {0}")]
    Rasterization(#[from] RasterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl JobError {
    /// Whether this failure stays scoped to a single file
    pub fn is_per_file(&self) -> bool {
        !matches!(self, JobError::Store(_) | JobError::Unexpected(_))
    }
}
