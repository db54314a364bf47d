//! Health and system information routes

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::queue::QueueSnapshot;
use crate::state::AppState;

/// Create the system router
pub fn router() -> Router<AppState> {
    Router::new().route("/info", get(info))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Scriptorium server is running",
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub version: &'static str,
    pub engine: String,
    pub engine_available: bool,
    pub endpoint: String,
    pub default_device: String,
    pub listeners: usize,
    pub queue: QueueSnapshot,
}

/// GET /api/system/info
async fn info(State(state): State<AppState>) -> Json<SystemInfo> {
    let engine = state.engine();

    Json(SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        engine: engine.name().to_string(),
        engine_available: engine.is_available().await,
        endpoint: state.config().ocr.endpoint.clone(),
        default_device: state.config().ocr.default_device.clone(),
        listeners: state.broadcaster().listener_count(),
        queue: state.queue().snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = app.json(empty_request("GET", "/api/health")).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_reports_engine_and_idle_queue() {
        let app = TestApp::new().await;
        let (status, body) = app.json(empty_request("GET", "/api/system/info")).await;
        assert_eq!(status, 200);
        assert_eq!(body["engineAvailable"], true);
        assert_eq!(body["queue"]["pending"], serde_json::json!([]));
        assert_eq!(body["queue"]["draining"], false);
    }
}
