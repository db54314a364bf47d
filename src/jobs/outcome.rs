//! Terminal outcome of a job run

use std::collections::BTreeMap;

use super::error::JobError;
use super::executor::ExecutionReport;
use super::types::{FileResult, JobRecord, JobStatus, JobUpdate};
use crate::events::Event;

/// Final state written back to the job record
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub progress: u8,
    pub per_file_results: BTreeMap<String, FileResult>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl JobOutcome {
    /// Classify a finished run by how many of its files failed.
    ///
    /// None failed: completed. Some failed: completed with a warning naming
    /// them. All failed: failed, with no results kept.
    pub fn classify(report: ExecutionReport) -> Self {
        let failed = report.failed_files.len();

        if failed == 0 {
            return Self {
                status: JobStatus::Completed,
                progress: 100,
                per_file_results: report.results,
                warning: None,
                error: None,
            };
        }

        let names = report.failed_files.join(", ");
        if failed < report.total_files {
            Self {
                status: JobStatus::CompletedWithWarnings,
                progress: 100,
                per_file_results: report.results,
                warning: Some(format!(
                    "{} of {} files failed: {}",
                    failed, report.total_files, names
                )),
                error: None,
            }
        } else {
            Self::failed(format!("All files failed: {}", names))
        }
    }

    /// A run stopped by an error outside the per-file boundary.
    ///
    /// The message names the job's files; the error itself is only logged.
    pub fn unexpected(job: &JobRecord, error: &JobError) -> Self {
        tracing::error!(job_id = %job.id, "Job failed unexpectedly: {}", error);

        let names: Vec<&str> = job.files.iter().map(|f| f.name.as_str()).collect();
        Self::failed(format!(
            "Processing stopped unexpectedly. Affected files: {}",
            names.join(", ")
        ))
    }

    fn failed(message: String) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 0,
            per_file_results: BTreeMap::new(),
            warning: None,
            error: Some(message),
        }
    }

    /// Store update persisting this outcome
    pub fn to_update(&self) -> JobUpdate {
        JobUpdate {
            status: Some(self.status),
            progress: Some(self.progress),
            per_file_results: Some(self.per_file_results.clone()),
            warning: Some(self.warning.clone()),
            error: Some(self.error.clone()),
            ..Default::default()
        }
    }

    /// Terminal push event: `job_complete` or `job_error`
    pub fn event(&self, job_id: &str) -> Event {
        match self.status {
            JobStatus::Failed => Event::JobError {
                job_id: job_id.to_string(),
                error: self.error.clone().unwrap_or_else(|| "Job failed".to_string()),
            },
            status => Event::JobComplete {
                job_id: job_id.to_string(),
                status,
                progress: self.progress,
                warning: self.warning.clone(),
            },
        }
    }
}
