//! Job execution
//!
//! Runs one job file by file, and PDFs page by page. Each extraction runs on
//! the blocking pool through a `StreamBridge`, so model output is pushed as
//! `ocr_chunk` events while it is generated.
//!
//! Per-file failures (missing input, rasterization, inference, result I/O)
//! are recorded and the next file starts. Only store failures and anything
//! unexpected abort the job.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;

use super::error::JobError;
use super::types::{FileEntry, FileKind, FileResult, JobRecord, JobUpdate, PdfResult, ResultRecord};
use crate::events::{Broadcaster, Event};
use crate::ocr::{Extraction, Extractor, OcrError, StreamBridge};
use crate::pages::PageSelection;
use crate::pdf::{RasterError, Rasterizer};
use crate::storage::{FileStore, JobStore};

/// What one run of a job produced
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Results of the files that did not fail, keyed by file id
    pub results: BTreeMap<String, FileResult>,
    /// Names of the files that failed, in job order
    pub failed_files: Vec<String>,
    pub total_files: usize,
}

/// Progress before file `index` of `total` starts
pub fn progress_before(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (index.min(total) * 100 / total) as u8
}

/// Executes jobs against the engine, rasterizer and storage
#[derive(Clone)]
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    files: FileStore,
    extractor: Extractor,
    rasterizer: Arc<dyn Rasterizer>,
    broadcaster: Broadcaster,
    default_device: String,
}

/// Where the image for one extraction comes from
enum ImageSource {
    /// An uploaded image, read in place
    Upload(PathBuf),
    /// A rendered PDF page, written to `path` for the extraction only
    Raster { path: PathBuf, image: DynamicImage },
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        files: FileStore,
        extractor: Extractor,
        rasterizer: Arc<dyn Rasterizer>,
        broadcaster: Broadcaster,
        default_device: &str,
    ) -> Self {
        Self {
            store,
            files,
            extractor,
            rasterizer,
            broadcaster,
            default_device: default_device.to_string(),
        }
    }

    /// Run every file of `job`.
    ///
    /// Progress is persisted and broadcast before each file. The terminal
    /// status is left to the caller.
    pub async fn execute(&self, job: &JobRecord) -> Result<ExecutionReport, JobError> {
        let total = job.files.len();
        let device = if job.device.trim().is_empty() {
            self.default_device.clone()
        } else {
            job.device.clone()
        };

        let results_dir = self.files.results_dir(&job.id);
        tokio::fs::create_dir_all(&results_dir).await.map_err(|e| {
            JobError::Unexpected(format!("cannot create {}: {}", results_dir.display(), e))
        })?;

        let mut report = ExecutionReport {
            total_files: total,
            ..Default::default()
        };

        for (index, file) in job.files.iter().enumerate() {
            tracing::info!(
                job_id = %job.id,
                file_id = %file.id,
                "Processing file {}/{}: {} ({:?})",
                index + 1,
                total,
                file.name,
                file.kind
            );

            let input = match self.locate_input(&job.id, file).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, file_id = %file.id, "{}", e);
                    report.failed_files.push(file.name.clone());
                    continue;
                }
            };

            let progress = progress_before(index, total);
            self.store.update(&job.id, JobUpdate::progress(progress)).await?;
            self.broadcaster.broadcast(&Event::JobProgress {
                job_id: job.id.clone(),
                progress,
                current_file: file.name.clone(),
            });

            match self.run_file(job, file, &input, &results_dir, &device).await {
                Ok(result) => {
                    report.results.insert(file.id.clone(), result);
                }
                Err(e) if e.is_per_file() => {
                    tracing::warn!(
                        job_id = %job.id,
                        file_id = %file.id,
                        "File {} failed: {}",
                        file.name,
                        e
                    );
                    report.failed_files.push(file.name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn locate_input(&self, job_id: &str, file: &FileEntry) -> Result<PathBuf, JobError> {
        let path = self
            .files
            .upload_path(job_id, &file.name)
            .map_err(|_| JobError::InputMissing(file.name.clone()))?;

        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(JobError::InputMissing(file.name.clone())),
        }
    }

    async fn run_file(
        &self,
        job: &JobRecord,
        file: &FileEntry,
        input: &Path,
        results_dir: &Path,
        device: &str,
    ) -> Result<FileResult, JobError> {
        match file.kind {
            FileKind::Pdf => self.run_pdf(job, file, input, results_dir, device).await,
            // Unknown kinds get the image path; decoding failure fails the file
            FileKind::Image | FileKind::Other => {
                self.run_image(job, file, input, results_dir, device).await
            }
        }
    }

    async fn run_image(
        &self,
        job: &JobRecord,
        file: &FileEntry,
        input: &Path,
        results_dir: &Path,
        device: &str,
    ) -> Result<FileResult, JobError> {
        let stem = file.stem();
        let extraction = self
            .extract(
                job,
                file,
                None,
                ImageSource::Upload(input.to_path_buf()),
                results_dir,
                format!("{}_", stem),
                device,
            )
            .await?;

        let out_name = format!("{}.md", stem);
        tokio::fs::write(results_dir.join(&out_name), &extraction.text).await?;

        let record = ResultRecord::new(&out_name, &extraction.text, extraction.image_names());
        tracing::info!(
            job_id = %job.id,
            file_id = %file.id,
            images = record.images.len(),
            "Saved {}",
            out_name
        );

        self.broadcaster.broadcast(&Event::FileComplete {
            job_id: job.id.clone(),
            file_id: file.id.clone(),
            result: record.clone(),
        });
        Ok(FileResult::Image(record))
    }

    async fn run_pdf(
        &self,
        job: &JobRecord,
        file: &FileEntry,
        input: &Path,
        results_dir: &Path,
        device: &str,
    ) -> Result<FileResult, JobError> {
        let selection = PageSelection::parse_report(&file.pages_sel).selection;
        tracing::debug!(job_id = %job.id, file_id = %file.id, pages = %selection, "Rasterizing");

        let rasterizer = self.rasterizer.clone();
        let path = input.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || rasterizer.render(&path, &selection))
            .await
            .map_err(|e| RasterError::RenderError {
                page: 0,
                message: format!("renderer stopped: {}", e),
            })??;

        let stem = file.stem();
        let mut page_results = BTreeMap::new();

        for (index, image) in pages {
            let page = index as u32 + 1;
            let source = ImageSource::Raster {
                path: results_dir.join(format!("temp_page_{}.png", index)),
                image,
            };
            let extraction = self
                .extract(
                    job,
                    file,
                    Some(page),
                    source,
                    results_dir,
                    format!("{}_page_{}_", stem, page),
                    device,
                )
                .await?;

            let md = format!("# {} - Page {}\n\n{}", stem, page, extraction.text);
            let out_name = format!("{}_page_{}.md", stem, page);
            tokio::fs::write(results_dir.join(&out_name), &md).await?;

            let record = ResultRecord::new(&out_name, &md, extraction.image_names()).with_page(page);
            tracing::info!(
                job_id = %job.id,
                file_id = %file.id,
                page,
                images = record.images.len(),
                "Saved {}",
                out_name
            );

            self.broadcaster.broadcast(&Event::PageComplete {
                job_id: job.id.clone(),
                file_id: file.id.clone(),
                page,
                result: record.clone(),
            });
            page_results.insert(page, record);
        }

        Ok(FileResult::Pdf(PdfResult::new(page_results)))
    }

    /// One extraction on the blocking pool, streamed through a bridge
    #[allow(clippy::too_many_arguments)]
    async fn extract(
        &self,
        job: &JobRecord,
        file: &FileEntry,
        page: Option<u32>,
        source: ImageSource,
        results_dir: &Path,
        prefix: String,
        device: &str,
    ) -> Result<Extraction, JobError> {
        let extractor = self.extractor.clone();
        let mode = job.mode;
        let output_dir = results_dir.to_path_buf();
        let device = device.to_string();

        let bridge = StreamBridge::new(self.broadcaster.clone(), &job.id, &file.id, page);
        bridge
            .run(move |on_fragment| -> Result<Extraction, JobError> {
                let (path, _raster) = match source {
                    ImageSource::Upload(path) => (path, None),
                    ImageSource::Raster { path, image } => {
                        let raster = TempRaster::write(path, &image)?;
                        (raster.path().to_path_buf(), Some(raster))
                    }
                };
                Ok(extractor.extract(mode, &path, &output_dir, &prefix, &device, on_fragment)?)
            })
            .await
            .map_err(|e| JobError::Inference(OcrError::WorkerPanicked(e.to_string())))?
    }
}

/// A rendered page on disk, removed when dropped
pub(crate) struct TempRaster {
    path: PathBuf,
}

impl TempRaster {
    pub(crate) fn write(path: PathBuf, image: &DynamicImage) -> Result<Self, JobError> {
        // Guard first, so a partial write is cleaned up too
        let raster = TempRaster { path };
        image
            .save(&raster.path)
            .map_err(|e| JobError::Io(std::io::Error::other(e.to_string())))?;
        Ok(raster)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempRaster {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "Failed to remove temp raster: {}", e);
            }
        }
    }
}
