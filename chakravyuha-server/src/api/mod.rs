//! API Module
//!
//! HTTP API layer of the server.
//! Each submodule handles endpoints for one concern.

pub mod download;
pub mod error;
pub mod health;
pub mod obfuscate;
pub mod session;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::service::job_service::JobService;

/// Create the main API router with all endpoints
pub fn create_router(jobs: Arc<JobService>, max_body_bytes: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/obfuscate", post(obfuscate::obfuscate))
        .route("/download/{job_id}/{artifact}", get(download::download))
        .route(
            "/sessions/{job_id}/visualizations/{*path}",
            get(session::visualization),
        )
        // Add state and middleware
        .with_state(jobs)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
