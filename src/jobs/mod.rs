//! Jobs
//!
//! The job record and its results, the execution routine that runs one job
//! file by file, outcome classification, and the one-shot batch path used
//! by the command-line tool.

pub mod batch;
mod error;
mod executor;
mod outcome;
mod types;

pub use error::JobError;
pub use executor::{progress_before, ExecutionReport, JobExecutor};
pub use outcome::JobOutcome;
pub use types::{
    default_job_name, file_stem, new_file_id, new_job_id, FileEntry, FileKind, FileResult,
    JobRecord, JobStatus, JobUpdate, PdfResult, ResultRecord, IMAGE_EXTENSIONS,
};
