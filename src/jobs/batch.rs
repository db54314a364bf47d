//! One-shot batch processing
//!
//! The command-line path: every input file becomes a `BatchJob` that runs to
//! completion on the calling thread. Unlike interactive jobs, a batch job is
//! all or nothing; any page failing fails the job.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::JobError;
use super::executor::TempRaster;
use super::types::{file_stem, FileKind};
use crate::ocr::{Extraction, Extractor, OcrMode};
use crate::pages::PageSelection;
use crate::pdf::Rasterizer;

/// Batch job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Per-job summary written next to the outputs
#[derive(Debug, Serialize)]
struct BatchMetadata<'a> {
    input_file: String,
    model_type: &'a str,
    status: BatchStatus,
    start_time: String,
    end_time: String,
    duration_seconds: f64,
    output_files: Vec<String>,
    timestamp: String,
}

/// One input file of a batch run
#[derive(Debug)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub mode: OcrMode,
    /// Page expression applied to PDFs; `None` renders every page
    pub pages: Option<String>,
    pub device: String,
    pub status: BatchStatus,
    pub error: Option<String>,
    pub output_files: Vec<PathBuf>,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
}

impl BatchJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        mode: OcrMode,
        pages: Option<String>,
        device: &str,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            mode,
            pages,
            device: device.to_string(),
            status: BatchStatus::Pending,
            error: None,
            output_files: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// Run the job. Returns whether it completed.
    pub fn execute(&mut self, extractor: &Extractor, rasterizer: &dyn Rasterizer) -> bool {
        self.status = BatchStatus::Processing;
        self.started_at = Some(Local::now());
        self.output_files.clear();

        let result = self
            .process(extractor, rasterizer)
            .and_then(|()| {
                self.status = BatchStatus::Completed;
                self.finished_at = Some(Local::now());
                self.write_metadata()
            });

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(input = %self.input.display(), "Job failed for {}: {}", self.file_name(), e);
                self.status = BatchStatus::Failed;
                self.error = Some(e.to_string());
                self.finished_at = Some(Local::now());
                false
            }
        }
    }

    fn process(&mut self, extractor: &Extractor, rasterizer: &dyn Rasterizer) -> Result<(), JobError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let name = self.file_name();
        if !self.input.is_file() {
            return Err(JobError::InputMissing(name));
        }
        match FileKind::from_filename(&name) {
            FileKind::Pdf => self.process_pdf(extractor, rasterizer),
            FileKind::Image => {
                let stem = file_stem(&name);
                let input = self.input.clone();
                self.extract_into(extractor, &input, &stem, &format!("{}_", stem))
            }
            FileKind::Other => Err(JobError::UnsupportedFile(name)),
        }
    }

    fn process_pdf(&mut self, extractor: &Extractor, rasterizer: &dyn Rasterizer) -> Result<(), JobError> {
        let selection = match &self.pages {
            Some(expr) => PageSelection::parse(expr),
            None => PageSelection::All,
        };
        let pages = rasterizer.render(&self.input, &selection)?;
        let stem = file_stem(&self.file_name());
        let total = pages.len();

        for (done, (index, image)) in pages.into_iter().enumerate() {
            let page = index + 1;
            let raster = TempRaster::write(
                self.output_dir.join(format!("temp_page_{}.png", index)),
                &image,
            )?;
            self.extract_into(
                extractor,
                raster.path(),
                &format!("{}_page_{}", stem, page),
                &format!("{}_page_{}_", stem, page),
            )?;
            tracing::debug!(input = %self.input.display(), page, "Page {}/{} done", done + 1, total);
        }
        Ok(())
    }

    /// Extract one image into `<out_stem>.md` plus any cropped regions
    fn extract_into(
        &mut self,
        extractor: &Extractor,
        image_path: &Path,
        out_stem: &str,
        prefix: &str,
    ) -> Result<(), JobError> {
        let Extraction { text, images } = extractor.extract(
            self.mode,
            image_path,
            &self.output_dir,
            prefix,
            &self.device,
            &mut |_| {},
        )?;

        let md_path = self.output_dir.join(format!("{}.md", out_stem));
        std::fs::write(&md_path, text)?;
        self.output_files.push(md_path);
        self.output_files
            .extend(images.into_iter().map(|(_, name)| self.output_dir.join(name)));
        Ok(())
    }

    /// Path of this job's metadata file
    pub fn metadata_path(&self) -> PathBuf {
        let stem = file_stem(&self.file_name());
        self.output_dir.join(format!("{}_metadata.json", stem))
    }

    fn write_metadata(&self) -> Result<(), JobError> {
        let (Some(start), Some(end)) = (self.started_at, self.finished_at) else {
            return Err(JobError::Unexpected("job has not run".to_string()));
        };

        let metadata = BatchMetadata {
            input_file: self.input.display().to_string(),
            model_type: match self.mode {
                OcrMode::TextOnly => "text_only",
                OcrMode::TextWithImages => "text_img",
            },
            status: self.status,
            start_time: start.to_rfc3339(),
            end_time: end.to_rfc3339(),
            duration_seconds: (end - start).num_milliseconds() as f64 / 1000.0,
            output_files: self
                .output_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            timestamp: Local::now().to_rfc3339(),
        };

        let content = serde_json::to_string_pretty(&metadata)
            .map_err(|e| JobError::Unexpected(e.to_string()))?;
        std::fs::write(self.metadata_path(), content)?;
        Ok(())
    }
}

/// FIFO of batch jobs
#[derive(Debug, Default)]
pub struct BatchQueue {
    pending: VecDeque<BatchJob>,
    pub completed: Vec<BatchJob>,
    pub failed: Vec<BatchJob>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: BatchJob) {
        tracing::debug!("Added job to queue: {}", job.file_name());
        self.pending.push_back(job);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every pending job in order. `on_done` sees each finished job with
    /// its 0-based index and the total. Returns `(completed, failed)`.
    pub fn process<F>(
        &mut self,
        extractor: &Extractor,
        rasterizer: &dyn Rasterizer,
        mut on_done: F,
    ) -> (usize, usize)
    where
        F: FnMut(&BatchJob, usize, usize),
    {
        let total = self.pending.len();
        tracing::info!(total, "Processing job queue");

        let mut index = 0;
        while let Some(mut job) = self.pending.pop_front() {
            let label = format!("{}_{:03}", file_stem(&job.file_name()), index + 1);
            tracing::info!(job = %label, "Processing start");

            if job.execute(extractor, rasterizer) {
                tracing::info!(job = %label, "Processing complete");
                on_done(&job, index, total);
                self.completed.push(job);
            } else {
                tracing::warn!(job = %label, "Processing failed");
                on_done(&job, index, total);
                self.failed.push(job);
            }
            index += 1;
        }

        tracing::debug!(
            completed = self.completed.len(),
            failed = self.failed.len(),
            "Queue processing complete"
        );
        (self.completed.len(), self.failed.len())
    }
}

/// Whether the batch path accepts this file
pub fn is_supported(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileKind::from_filename(&name) != FileKind::Other
}

/// Expand the command-line paths into input files.
///
/// Directories contribute their supported files (not recursive, sorted).
/// Unsupported and missing paths are skipped with a warning.
pub fn collect_input_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for raw in paths {
        let path = normalize_path(raw);
        if path.is_file() {
            if is_supported(&path) {
                files.push(path);
            } else {
                tracing::warn!("Skipping {}: unsupported file format", path.display());
            }
        } else if path.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(entries) => {
                    let mut found: Vec<PathBuf> = entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.is_file() && is_supported(p))
                        .collect();
                    found.sort();
                    files.extend(found);
                }
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        } else {
            tracing::warn!("Path not found: {}", path.display());
        }
    }

    files
}

/// Strip surrounding whitespace and quotes left by drag-and-drop
fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(raw.trim().trim_matches(|c| c == '"' || c == '\''))
}

/// `<root>/<YYYYMMDD_HHMMSS>`
pub fn batch_output_dir(root: &Path) -> PathBuf {
    root.join(Local::now().format("%Y%m%d_%H%M%S").to_string())
}
