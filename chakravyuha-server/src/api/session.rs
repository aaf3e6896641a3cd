//! Session API Handler
//!
//! Read-only access to the visualization pages of a completed job.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::artifact_service;
use crate::service::job_service::JobService;

/// GET /sessions/{job_id}/visualizations/{*path}
/// Serve one visualization file
pub async fn visualization(
    State(jobs): State<Arc<JobService>>,
    Path((job_id, path)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Serving visualization {} for job {}", path, job_id);

    let (bytes, content_type) =
        artifact_service::read_visualization(jobs.workspaces(), &job_id, &path).await?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
