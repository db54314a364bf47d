//! Batch download route

use axum::{extract::State, response::Response, routing::post, Json, Router};
use serde::Deserialize;

use crate::archive;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the batch router
pub fn router() -> Router<AppState> {
    Router::new().route("/download", post(download))
}

#[derive(Deserialize)]
pub struct BatchDownloadRequest {
    #[serde(default)]
    pub job_ids: Vec<String>,
}

/// POST /api/batch/download
///
/// Zips the results of several jobs, one folder per job name. Unknown ids
/// are skipped.
async fn download(
    State(state): State<AppState>,
    Json(request): Json<BatchDownloadRequest>,
) -> Result<Response> {
    if request.job_ids.is_empty() {
        return Err(AppError::BadRequest("No job IDs provided".to_string()));
    }

    let mut entries = Vec::with_capacity(request.job_ids.len());
    for id in &request.job_ids {
        match state.store().get(id).await? {
            Some(job) => entries.push((job.name.clone(), state.files().results_dir(id))),
            None => tracing::debug!(job_id = %id, "Skipping unknown job in batch download"),
        }
    }

    let bytes = tokio::task::spawn_blocking(move || archive::batch_zip(&entries))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    super::zip_response(bytes, &archive::batch_zip_filename())
}
