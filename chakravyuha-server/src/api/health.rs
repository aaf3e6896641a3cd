//! Health Check API Handler
//!
//! Liveness endpoint for monitoring, with the number of live workspaces.

use axum::{Json, extract::State, http::StatusCode};
use chakravyuha_core::dto::health::HealthResponse;
use std::sync::Arc;

use crate::service::job_service::JobService;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(jobs): State<Arc<JobService>>) -> (StatusCode, Json<HealthResponse>) {
    match jobs.workspaces().entries().await {
        Ok(entries) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                workspaces: entries.len(),
            }),
        ),
        Err(e) => {
            tracing::error!("Scratch root unreadable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    workspaces: 0,
                }),
            )
        }
    }
}
