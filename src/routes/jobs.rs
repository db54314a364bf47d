//! Job API endpoints
//!
//! - POST /api/jobs - Create a job from uploaded files
//! - GET /api/jobs - List jobs
//! - GET /api/jobs/:id - Get a job
//! - DELETE /api/jobs/:id - Delete a job and its files
//! - POST /api/jobs/:id/enqueue - Queue a job for processing
//! - POST /api/jobs/:id/files/add - Upload more files into a job
//! - PUT /api/jobs/:id/files/:file_id/pages - Set a file's page selection
//! - PUT /api/jobs/:id/name | mode | device - Field updates

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::jobs::{new_job_id, FileEntry, FileKind, JobRecord, JobUpdate};
use crate::ocr::OcrMode;
use crate::state::AppState;
use crate::storage::safe_file_name;

/// Create the jobs router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/:id", get(get_job).delete(delete_job))
        .route("/:id/enqueue", post(enqueue_job))
        .route("/:id/files/add", post(add_files))
        .route("/:id/files/:name/pages", put(set_page_selection))
        .route("/:id/name", put(rename_job))
        .route("/:id/mode", put(set_mode))
        .route("/:id/device", put(set_device))
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobRecord>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub message: String,
    pub queue_position: usize,
}

#[derive(Serialize)]
pub struct AddFilesResponse {
    pub message: String,
    pub files: Vec<FileEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSelectionRequest {
    #[serde(default = "default_pages_sel")]
    pub pages_sel: String,
}

fn default_pages_sel() -> String {
    "all".to_string()
}

#[derive(Serialize)]
pub struct PageSelectionResponse {
    pub message: String,
    pub file_id: String,
    #[serde(rename = "pagesSel")]
    pub pages_sel: String,
}

#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Deserialize)]
pub struct DeviceRequest {
    pub device: String,
}

/// Uploaded files and plain fields of a multipart form
#[derive(Default)]
struct UploadForm {
    files: Vec<(String, Bytes)>,
    fields: HashMap<String, String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(|s| s.to_string());

        match filename {
            Some(filename) if name == "files" || name == "files[]" || name == "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
                tracing::debug!("Received file '{}' ({} bytes)", filename, data.len());
                form.files.push((filename, data));
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read field: {}", e)))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

/// Save uploads into a job's `files/` folder and describe them
async fn store_uploads(
    state: &AppState,
    job_id: &str,
    uploads: Vec<(String, Bytes)>,
) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::with_capacity(uploads.len());

    for (filename, data) in uploads {
        let filename = safe_file_name(&filename)?;
        let path = state.files().save_upload(job_id, &filename, &data).await?;

        let page_count = match FileKind::from_filename(&filename) {
            FileKind::Pdf => {
                let rasterizer = state.rasterizer().clone();
                let counted = tokio::task::spawn_blocking(move || rasterizer.page_count(&path))
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                counted.unwrap_or_else(|e| {
                    tracing::warn!(job_id, "Failed to count PDF pages of {}: {}", filename, e);
                    1
                })
            }
            _ => 1,
        };

        entries.push(FileEntry::new(&filename, page_count));
    }

    Ok(entries)
}

async fn load_job(state: &AppState, id: &str) -> Result<JobRecord> {
    state
        .store()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
}

async fn update_job(state: &AppState, id: &str, update: JobUpdate) -> Result<Json<JobRecord>> {
    state
        .store()
        .update(id, update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
}

/// List all jobs, oldest first
async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobListResponse>> {
    let jobs = state.store().list().await?;
    Ok(Json(JobListResponse { jobs }))
}

/// Create a job from `files`, `mode`, `device` and `kind` form fields
async fn create_job(State(state): State<AppState>, multipart: Multipart) -> Result<Json<JobRecord>> {
    let form = read_form(multipart).await?;
    if form.files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }

    let mode = match form.fields.get("mode") {
        Some(raw) => raw
            .parse::<OcrMode>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => OcrMode::default(),
    };
    let device = form
        .fields
        .get("device")
        .cloned()
        .unwrap_or_else(|| state.config().ocr.default_device.clone());
    let kind = form.fields.get("kind").cloned().unwrap_or_else(|| "img".to_string());

    let job_id = new_job_id();
    state.files().create_job_dirs(&job_id).await?;
    let files = store_uploads(&state, &job_id, form.files).await?;

    let mut job = JobRecord::new(&kind, files, mode, &device);
    job.id = job_id;
    let job = state.store().create(job).await?;

    tracing::info!(job_id = %job.id, files = job.files.len(), mode = %job.mode, "Job created");
    Ok(Json(job))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobRecord>> {
    Ok(Json(load_job(&state, &id).await?))
}

/// Delete a job record and everything stored for it
async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    if !state.store().delete(&id).await? {
        return Err(AppError::NotFound("Job not found".to_string()));
    }
    state.files().remove_job(&id).await?;

    tracing::info!(job_id = %id, "Job deleted");
    Ok(Json(MessageResponse {
        message: "Job deleted".to_string(),
    }))
}

async fn enqueue_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EnqueueResponse>> {
    let queue_position = state.queue().enqueue(&id).await?;
    Ok(Json(EnqueueResponse {
        message: "Job enqueued".to_string(),
        queue_position,
    }))
}

async fn add_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<AddFilesResponse>> {
    let job = load_job(&state, &id).await?;
    let form = read_form(multipart).await?;
    let added = store_uploads(&state, &id, form.files).await?;

    let mut files = job.files;
    files.extend(added.iter().cloned());
    let update = JobUpdate {
        files: Some(files),
        ..Default::default()
    };
    state
        .store()
        .update(&id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(AddFilesResponse {
        message: format!("Added {} files", added.len()),
        files: added,
    }))
}

/// Store the raw expression; it is parsed when the job runs
async fn set_page_selection(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(String, String)>,
    Json(request): Json<PageSelectionRequest>,
) -> Result<Json<PageSelectionResponse>> {
    let mut job = load_job(&state, &id).await?;
    let file = job
        .file_mut(&file_id)
        .ok_or_else(|| AppError::NotFound("File not found in job".to_string()))?;
    file.pages_sel = request.pages_sel.clone();

    let update = JobUpdate {
        files: Some(job.files),
        ..Default::default()
    };
    state.store().update(&id, update).await?;

    Ok(Json(PageSelectionResponse {
        message: "Page selection updated".to_string(),
        file_id,
        pages_sel: request.pages_sel,
    }))
}

async fn rename_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<NameRequest>,
) -> Result<Json<JobRecord>> {
    let update = JobUpdate {
        name: Some(request.name),
        ..Default::default()
    };
    update_job(&state, &id, update).await
}

async fn set_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<JobRecord>> {
    let mode = request
        .mode
        .parse::<OcrMode>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let update = JobUpdate {
        mode: Some(mode),
        ..Default::default()
    };
    update_job(&state, &id, update).await
}

async fn set_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<JobRecord>> {
    let update = JobUpdate {
        device: Some(request.device),
        ..Default::default()
    };
    update_job(&state, &id, update).await
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::jobs::JobStatus;

    #[tokio::test]
    async fn test_create_and_fetch_job() {
        let app = TestApp::new().await;
        let job = app
            .create_job(&[("scan.png", png_bytes()), ("book.pdf", b"%PDF".to_vec())], "text")
            .await;

        assert_eq!(job["status"], "queued");
        assert_eq!(job["mode"], "text");
        assert_eq!(job["device"], "cpu");
        assert_eq!(job["files"][0]["type"], "image");
        assert_eq!(job["files"][1]["type"], "pdf");
        // Page count comes from the rasterizer
        assert_eq!(job["files"][1]["pageCount"], 3);

        let id = job["id"].as_str().unwrap();
        assert!(app.dir.path().join(id).join("files/scan.png").exists());

        let (status, fetched) = app.json(empty_request("GET", &format!("/api/jobs/{}", id))).await;
        assert_eq!(status, 200);
        assert_eq!(fetched["id"], job["id"]);

        let (status, list) = app.json(empty_request("GET", "/api/jobs")).await;
        assert_eq!(status, 200);
        assert_eq!(list["jobs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let app = TestApp::new().await;

        let (status, body) = app
            .json(multipart_request("/api/jobs", &[], &[("mode", "text")]))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "bad_request");

        let (status, _) = app
            .json(multipart_request("/api/jobs", &[("a.png", png_bytes())], &[("mode", "poetry")]))
            .await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let app = TestApp::new().await;
        let (status, body) = app.json(empty_request("GET", "/api/jobs/nope")).await;
        assert_eq!(status, 404);
        assert_eq!(body["message"], "Job not found");

        let (status, _) = app.json(empty_request("POST", "/api/jobs/nope/enqueue")).await;
        assert_eq!(status, 404);
        let (status, _) = app.json(empty_request("DELETE", "/api/jobs/nope")).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_field_updates() {
        let app = TestApp::new().await;
        let job = app.create_job(&[("book.pdf", b"%PDF".to_vec())], "text").await;
        let id = job["id"].as_str().unwrap();
        let file_id = job["files"][0]["id"].as_str().unwrap();

        let (status, body) = app
            .json(json_request(
                "PUT",
                &format!("/api/jobs/{}/files/{}/pages", id, file_id),
                serde_json::json!({"pagesSel": "1-2"}),
            ))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["pagesSel"], "1-2");

        let (_, renamed) = app
            .json(json_request("PUT", &format!("/api/jobs/{}/name", id), serde_json::json!({"name": "Ledger"})))
            .await;
        assert_eq!(renamed["name"], "Ledger");
        assert_eq!(renamed["files"][0]["pagesSel"], "1-2");

        let (_, updated) = app
            .json(json_request("PUT", &format!("/api/jobs/{}/mode", id), serde_json::json!({"mode": "text-img"})))
            .await;
        assert_eq!(updated["mode"], "img");

        let (status, _) = app
            .json(json_request("PUT", &format!("/api/jobs/{}/mode", id), serde_json::json!({"mode": "x"})))
            .await;
        assert_eq!(status, 400);

        let (status, _) = app
            .json(json_request(
                "PUT",
                &format!("/api/jobs/{}/files/missing/pages", id),
                serde_json::json!({"pagesSel": "1"}),
            ))
            .await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_add_files_and_delete() {
        let app = TestApp::new().await;
        let job = app.create_job(&[("a.png", png_bytes())], "text").await;
        let id = job["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .json(multipart_request(
                &format!("/api/jobs/{}/files/add", id),
                &[("b.png", png_bytes())],
                &[],
            ))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Added 1 files");

        let (_, fetched) = app.json(empty_request("GET", &format!("/api/jobs/{}", id))).await;
        assert_eq!(fetched["files"].as_array().unwrap().len(), 2);

        let (status, _) = app.json(empty_request("DELETE", &format!("/api/jobs/{}", id))).await;
        assert_eq!(status, 200);
        assert!(!app.dir.path().join(&id).exists());
    }

    #[tokio::test]
    async fn test_enqueue_runs_job() {
        let app = TestApp::new().await;
        let job = app.create_job(&[("a.png", png_bytes())], "text").await;
        let id = job["id"].as_str().unwrap();

        let (status, body) = app.json(empty_request("POST", &format!("/api/jobs/{}/enqueue", id))).await;
        assert_eq!(status, 200);
        assert_eq!(body["queue_position"], 1);

        app.state.queue().wait_until_idle().await;
        let (_, done) = app.json(empty_request("GET", &format!("/api/jobs/{}", id))).await;
        assert_eq!(done["status"], serde_json::to_value(JobStatus::Completed).unwrap());
        assert_eq!(done["progress"], 100);
        let file_id = done["files"][0]["id"].as_str().unwrap();
        assert_eq!(done["perFileResults"][file_id]["md"], "# Extracted");
    }
}
