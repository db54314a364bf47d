//! Result routes
//!
//! - GET /api/jobs/:id/results/:name - Download one result file
//! - PUT /api/jobs/:id/results/:name - Save an edited markdown result
//! - GET /api/jobs/:id/download/zip - Download all results with a manifest

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::archive;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the results router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/results/:name", get(download_result).put(save_result))
        .route("/:id/download/zip", get(download_zip))
}

#[derive(Deserialize)]
pub struct EditResultRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct EditResultResponse {
    pub message: String,
    pub filename: String,
}

async fn download_result(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response> {
    let path = state.files().result_path(&id, &name)?;
    let content_type = name.ends_with(".md").then_some("text/markdown; charset=utf-8");
    super::serve_file(&path, content_type).await
}

/// Overwrite a result file. The job record, including `originalMd`, is left
/// as it is.
async fn save_result(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(request): Json<EditResultRequest>,
) -> Result<Json<EditResultResponse>> {
    if state.store().get(&id).await?.is_none() {
        return Err(AppError::NotFound("Job not found".to_string()));
    }

    state.files().write_result(&id, &name, &request.content).await?;
    tracing::debug!(job_id = %id, "Saved edited result {}", name);

    Ok(Json(EditResultResponse {
        message: "Result saved successfully".to_string(),
        filename: name,
    }))
}

async fn download_zip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let job = state
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    let results_dir = state.files().results_dir(&id);
    let filename = archive::job_zip_filename(&job.name);
    let bytes = tokio::task::spawn_blocking(move || archive::job_results_zip(&job, &results_dir))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    super::zip_response(bytes, &filename)
}
