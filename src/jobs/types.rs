//! Job Types
//!
//! The persisted job record, its file entries and the per-file result
//! variants.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::ocr::OcrMode;

/// Extensions treated as images
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "tif", "gif"];

/// Kind of an uploaded file, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[serde(alias = "img")]
    Image,
    Pdf,
    #[serde(alias = "file")]
    Other,
}

impl FileKind {
    pub fn from_filename(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if ext == "pdf" {
            FileKind::Pdf
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Image
        } else {
            FileKind::Other
        }
    }
}

fn default_pages_sel() -> String {
    "all".to_string()
}

fn default_page_count() -> usize {
    1
}

/// One uploaded file of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Raw page-range expression, parsed when the job runs
    #[serde(default = "default_pages_sel")]
    pub pages_sel: String,
    #[serde(default = "default_page_count")]
    pub page_count: usize,
}

impl FileEntry {
    pub fn new(name: &str, page_count: usize) -> Self {
        Self {
            id: new_file_id(),
            name: name.to_string(),
            kind: FileKind::from_filename(name),
            pages_sel: default_pages_sel(),
            page_count,
        }
    }

    /// File name without its extension
    pub fn stem(&self) -> String {
        file_stem(&self.name)
    }
}

/// Interactive job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    CompletedWithWarnings,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithWarnings | JobStatus::Failed
        )
    }
}

/// Result of one extraction unit: a whole image or one PDF page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// 1-indexed page number, PDF pages only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub out_name: String,
    pub md: String,
    /// Snapshot taken at creation; edits never touch it
    pub original_md: String,
    pub images: Vec<String>,
}

impl ResultRecord {
    pub fn new(out_name: &str, md: &str, images: Vec<String>) -> Self {
        Self {
            page: None,
            out_name: out_name.to_string(),
            md: md.to_string(),
            original_md: md.to_string(),
            images,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Pages of one PDF, keyed by 1-indexed page number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfResult {
    pub pages: BTreeMap<u32, ResultRecord>,
    pub is_pdf: bool,
    pub total_pages: usize,
}

impl PdfResult {
    pub fn new(pages: BTreeMap<u32, ResultRecord>) -> Self {
        let total_pages = pages.len();
        Self {
            pages,
            is_pdf: true,
            total_pages,
        }
    }
}

/// Result of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileResult {
    Image(ResultRecord),
    Pdf(PdfResult),
}

/// Variant chosen by the `isPdf` marker. Untagged buffering would keep page
/// keys as strings and reject them as `u32`.
impl<'de> Deserialize<'de> for FileResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_pdf = value
            .get("isPdf")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let result = if is_pdf {
            serde_json::from_value(value).map(FileResult::Pdf)
        } else {
            serde_json::from_value(value).map(FileResult::Image)
        };
        result.map_err(de::Error::custom)
    }
}

/// A persisted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Upload kind declared by the client
    #[serde(default)]
    pub kind: String,
    pub files: Vec<FileEntry>,
    pub mode: OcrMode,
    pub device: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub per_file_results: BTreeMap<String, FileResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(kind: &str, files: Vec<FileEntry>, mode: OcrMode, device: &str) -> Self {
        Self {
            id: new_job_id(),
            name: default_job_name(),
            created_at: Utc::now(),
            kind: kind.to_string(),
            files,
            mode,
            device: device.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            per_file_results: BTreeMap::new(),
            warning: None,
            error: None,
        }
    }

    pub fn file(&self, file_id: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.id == file_id)
    }

    pub fn file_mut(&mut self, file_id: &str) -> Option<&mut FileEntry> {
        self.files.iter_mut().find(|f| f.id == file_id)
    }
}

/// Partial update of a job record; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub mode: Option<OcrMode>,
    pub device: Option<String>,
    pub files: Option<Vec<FileEntry>>,
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub per_file_results: Option<BTreeMap<String, FileResult>>,
    pub warning: Option<Option<String>>,
    pub error: Option<Option<String>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn apply(self, job: &mut JobRecord) {
        if let Some(name) = self.name {
            job.name = name;
        }
        if let Some(mode) = self.mode {
            job.mode = mode;
        }
        if let Some(device) = self.device {
            job.device = device;
        }
        if let Some(files) = self.files {
            job.files = files;
        }
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress.min(100);
        }
        if let Some(results) = self.per_file_results {
            job.per_file_results = results;
        }
        if let Some(warning) = self.warning {
            job.warning = warning;
        }
        if let Some(error) = self.error {
            job.error = error;
        }
    }
}

/// 12 hex characters
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// 8 hex characters
pub fn new_file_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Local timestamp, `YYYY-MM-DD HH:MM:SS`
pub fn default_job_name() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// File name without its extension
pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}
