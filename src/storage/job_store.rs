//! Job metadata store
//!
//! All job records live in one JSON document, `<output>/cards.json`, keyed
//! by job id. The document is loaded once and rewritten after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StoreError;
use crate::jobs::{JobRecord, JobUpdate};

/// File name of the metadata document
pub const CARDS_FILE: &str = "cards.json";

/// Persistent job store
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<JobRecord>, StoreError>;

    async fn create(&self, job: JobRecord) -> Result<JobRecord, StoreError>;

    /// Apply an update. Returns the updated record, or `None` for unknown ids.
    async fn update(&self, id: &str, update: JobUpdate) -> Result<Option<JobRecord>, StoreError>;

    /// Returns false for unknown ids
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// All jobs, oldest first
    async fn list(&self) -> Result<Vec<JobRecord>, StoreError>;
}

/// `cards.json`-backed store
pub struct JsonJobStore {
    path: PathBuf,
    jobs: Mutex<BTreeMap<String, JobRecord>>,
}

impl JsonJobStore {
    /// Open the store under `output_dir`, creating the directory if needed.
    ///
    /// A document that exists but does not parse is an error; it is never
    /// replaced with an empty store.
    pub async fn open(output_dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(CARDS_FILE);

        let jobs = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                tracing::error!(path = %path.display(), "Job store is malformed: {}", e);
                StoreError::Json(e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), jobs = jobs.len(), "Job store opened");
        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    async fn persist(&self, jobs: &BTreeMap<String, JobRecord>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(jobs)?;
        // Written beside the document, then renamed over it
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn get(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn create(&self, job: JobRecord) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.lock().await;
        jobs.insert(job.id.clone(), job.clone());
        self.persist(&jobs).await?;
        Ok(job)
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<Option<JobRecord>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let updated = match jobs.get_mut(id) {
            Some(job) => {
                update.apply(job);
                job.clone()
            }
            None => return Ok(None),
        };
        self.persist(&jobs).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&jobs).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut jobs: Vec<JobRecord> = self.jobs.lock().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{FileEntry, FileResult, JobStatus, PdfResult, ResultRecord};
    use crate::ocr::OcrMode;
    use tempfile::TempDir;

    fn job() -> JobRecord {
        JobRecord::new("img", vec![FileEntry::new("a.png", 1)], OcrMode::TextOnly, "cpu")
    }

    #[tokio::test]
    async fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let created = {
            let store = JsonJobStore::open(dir.path()).await.unwrap();
            store.create(job()).await.unwrap()
        };

        let reopened = JsonJobStore::open(dir.path()).await.unwrap();
        let loaded = reopened.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(dir.path().join(CARDS_FILE).exists());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = JsonJobStore::open(dir.path()).await.unwrap();
        let created = store.create(job()).await.unwrap();

        let updated = store
            .update(&created.id, JobUpdate::status(JobStatus::Running).with_progress(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(updated.progress, 50);

        assert!(store.update("missing", JobUpdate::progress(1)).await.unwrap().is_none());

        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cards = dir.path().join(CARDS_FILE);
        std::fs::write(&cards, "{not json").unwrap();

        let result = JsonJobStore::open(dir.path()).await;
        assert!(matches!(result, Err(StoreError::Json(_))));
        // Left as it was
        assert_eq!(std::fs::read_to_string(&cards).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_results_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let mut record = JobRecord::new(
            "img",
            vec![FileEntry::new("a.png", 1), FileEntry::new("book.pdf", 3)],
            OcrMode::TextOnly,
            "cpu",
        );
        let (image_id, pdf_id) = (record.files[0].id.clone(), record.files[1].id.clone());

        let mut pages = BTreeMap::new();
        pages.insert(1, ResultRecord::new("book_page_1.md", "# book - Page 1\n\none", vec![]).with_page(1));
        pages.insert(
            3,
            ResultRecord::new("book_page_3.md", "three", vec!["book_page_3_image_1.png".into()])
                .with_page(3),
        );
        record.per_file_results.insert(pdf_id.clone(), FileResult::Pdf(PdfResult::new(pages)));
        record.per_file_results.insert(
            image_id.clone(),
            FileResult::Image(ResultRecord::new("a.md", "text", vec![])),
        );
        record.status = JobStatus::Completed;
        record.progress = 100;

        let created = {
            let store = JsonJobStore::open(dir.path()).await.unwrap();
            store.create(record).await.unwrap()
        };

        let reopened = JsonJobStore::open(dir.path()).await.unwrap();
        let loaded = reopened.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(matches!(loaded.per_file_results.get(&image_id), Some(FileResult::Image(_))));
        match loaded.per_file_results.get(&pdf_id) {
            Some(FileResult::Pdf(pdf)) => {
                assert_eq!(pdf.pages.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
            }
            other => panic!("unexpected result {:?}", other),
        }

        // A later write keeps the reloaded jobs
        reopened.create(job()).await.unwrap();
        let again = JsonJobStore::open(dir.path()).await.unwrap();
        assert_eq!(again.list().await.unwrap().len(), 2);
    }
}
