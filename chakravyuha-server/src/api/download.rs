//! Download API Handler
//!
//! Streams a completed job's binary exactly once. The workspace is destroyed
//! when the stream ends, whether the transfer finished or the client left.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::api::error::{ApiError, ApiResult};
use crate::service::artifact_service::{self, ClaimedArtifact};
use crate::service::job_service::JobService;

/// GET /download/{job_id}/{artifact}
/// Download a build artifact, consuming the job
pub async fn download(
    State(jobs): State<Arc<JobService>>,
    Path((job_id, artifact)): Path<(String, String)>,
) -> ApiResult<Response> {
    let ClaimedArtifact {
        name,
        size,
        file,
        guard,
    } = artifact_service::claim(jobs.workspaces(), &job_id, &artifact).await?;

    // The guard rides along with the body and drops with it
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _ = &guard;
        if let Err(e) = &chunk {
            tracing::warn!("Download of {} interrupted: {}", name, e);
        }
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact),
        )
        .header(header::CONTENT_LENGTH, size)
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::InternalError(format!("Failed to build download response: {}", e)))
}
