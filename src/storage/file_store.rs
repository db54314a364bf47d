//! Upload and result files
//!
//! Layout under the output root:
//!
//! ```text
//! <output>/<job_id>/files/<upload name>
//! <output>/<job_id>/results/<result name>
//! ```

use std::path::{Component, Path, PathBuf};

use super::StoreError;

/// On-disk layout of job inputs and outputs
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub fn files_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("files")
    }

    pub fn results_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("results")
    }

    /// Create the `files/` and `results/` folders of a job
    pub async fn create_job_dirs(&self, job_id: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.files_dir(job_id)).await?;
        tokio::fs::create_dir_all(self.results_dir(job_id)).await?;
        Ok(())
    }

    /// Path of an uploaded file
    pub fn upload_path(&self, job_id: &str, filename: &str) -> Result<PathBuf, StoreError> {
        Ok(self.files_dir(job_id).join(safe_file_name(filename)?))
    }

    /// Path of a result file
    pub fn result_path(&self, job_id: &str, filename: &str) -> Result<PathBuf, StoreError> {
        Ok(self.results_dir(job_id).join(safe_file_name(filename)?))
    }

    /// Store an upload, replacing any file of the same name
    pub async fn save_upload(
        &self,
        job_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let path = self.upload_path(job_id, filename)?;
        tokio::fs::create_dir_all(self.files_dir(job_id)).await?;
        tokio::fs::write(&path, data).await?;

        tracing::debug!(job_id, filename, bytes = data.len(), "Upload saved");
        Ok(path)
    }

    /// Write a result file
    pub async fn write_result(
        &self,
        job_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, StoreError> {
        let path = self.result_path(job_id, filename)?;
        tokio::fs::create_dir_all(self.results_dir(job_id)).await?;
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Remove everything stored for a job
    pub async fn remove_job(&self, job_id: &str) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduce a client-supplied name to a single path component
pub fn safe_file_name(name: &str) -> Result<String, StoreError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(part.to_string_lossy().into_owned()),
        _ => Err(StoreError::InvalidFileName(name.to_string())),
    }
}
