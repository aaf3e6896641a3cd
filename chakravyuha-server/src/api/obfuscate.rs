//! Obfuscation API Handler
//!
//! Synchronous job submission: the response is sent once the job has
//! completed or failed.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chakravyuha_core::dto::obfuscate::{ObfuscateRequest, ObfuscateResponse};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::service::job_service::JobService;

/// POST /obfuscate
/// Run one obfuscation job
pub async fn obfuscate(
    State(jobs): State<Arc<JobService>>,
    payload: Result<Json<ObfuscateRequest>, JsonRejection>,
) -> ApiResult<Json<ObfuscateResponse>> {
    let Json(req) = payload.map_err(ApiError::from)?;

    tracing::debug!(
        "Obfuscation requested (cycles: {:?}, level: {:?}, cfg: {:?})",
        req.cycles,
        req.level,
        req.generate_cfg
    );

    let completed = jobs.submit(req).await?;

    Ok(Json(ObfuscateResponse {
        success: true,
        report: completed.report,
        download_path: completed.download_path,
        comparison_page_path: completed.comparison_page_path,
    }))
}
