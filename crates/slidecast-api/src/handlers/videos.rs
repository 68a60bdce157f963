//! Video download handler.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use slidecast_storage::parse_public_name;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Serve a finished slideshow (`/videos/job_{id}.mp4`).
///
/// `ServeFile` sets `video/mp4` from the extension and answers range
/// requests.
pub async fn get_video(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let job_id = parse_public_name(&name)
        .ok_or_else(|| ApiError::not_found(format!("video {}", name)))?;

    let path = state.assets.resolve(job_id).await?;
    debug!(job_id = %job_id, path = %path.display(), "Serving video");

    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read video: {}", e)))?;

    Ok(response.map(Body::new).into_response())
}

