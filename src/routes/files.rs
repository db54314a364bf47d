//! Upload serving routes
//!
//! Serves the original uploads of a job for preview.

use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};

use crate::error::Result;
use crate::state::AppState;

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new().route("/:id/files/:name", get(serve_upload))
}

/// GET /api/jobs/:id/files/:name
async fn serve_upload(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response> {
    let path = state.files().upload_path(&id, &name)?;
    super::serve_file(&path, None).await
}
