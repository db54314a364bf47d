//! Route modules for the Scriptorium server
//!
//! Thin handlers over the job store, file store and queue.

pub mod batch;
pub mod files;
pub mod jobs;
pub mod results;
pub mod system;
pub mod ws;

use std::path::Path;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Build the application router (without the HTTP layers added by `main`)
pub fn app(state: AppState) -> Router {
    let upload_limit = state.config().max_upload_bytes();

    let job_routes = jobs::router()
        .merge(files::router())
        .merge(results::router())
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/api/health", get(system::health))
        .nest("/api/system", system::router())
        .nest("/api/jobs", job_routes)
        .nest("/api/batch", batch::router())
        .route("/ws", get(ws::handler))
        .with_state(state)
}

/// Serve a stored file, `404` if it does not exist
pub(crate) async fn serve_file(path: &Path, content_type: Option<&str>) -> Result<Response> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = content_type.map(str::to_string).unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Zip archive download response
pub(crate) fn zip_response(bytes: Vec<u8>, filename: &str) -> Result<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::ocr::ScriptedEngine;
    use crate::pdf::BlankRasterizer;
    use crate::state::AppState;
    use crate::storage::JsonJobStore;

    pub const BOUNDARY: &str = "scriptorium-test-boundary";

    pub struct TestApp {
        pub dir: TempDir,
        pub state: AppState,
    }

    impl TestApp {
        pub async fn new() -> Self {
            Self::with_engine(ScriptedEngine::new("# Extracted")).await
        }

        pub async fn with_engine(engine: ScriptedEngine) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = Config::default();
            config.storage.output_dir = dir.path().to_path_buf();

            let store = Arc::new(JsonJobStore::open(dir.path()).await.unwrap());
            let state = AppState::with_components(
                config,
                store,
                Arc::new(engine),
                Arc::new(BlankRasterizer::with_pages(3)),
            );
            Self { dir, state }
        }

        pub async fn send(&self, request: Request<Body>) -> Response<Body> {
            super::app(self.state.clone()).oneshot(request).await.unwrap()
        }

        pub async fn json(&self, request: Request<Body>) -> (u16, serde_json::Value) {
            let response = self.send(request).await;
            let status = response.status().as_u16();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
            (status, value)
        }

        /// Create a job through the upload endpoint
        pub async fn create_job(&self, files: &[(&str, Vec<u8>)], mode: &str) -> serde_json::Value {
            let (status, job) = self
                .json(multipart_request("/api/jobs", files, &[("mode", mode), ("device", "cpu"), ("kind", "img")]))
                .await;
            assert_eq!(status, 200, "create failed: {}", job);
            job
        }
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub fn multipart_request(
        uri: &str,
        files: &[(&str, Vec<u8>)],
        fields: &[(&str, &str)],
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        for (filename, data) in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(16, 16))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }
}
