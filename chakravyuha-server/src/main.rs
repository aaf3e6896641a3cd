//! Chakravyuha Server
//!
//! HTTP front end of the obfuscation toolchain.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Workspaces: One isolated directory tree per job under a scratch root
//! - Process: Run the external tools with captured output and a timeout
//! - Services: Job lifecycle, report aggregation and artifact delivery
//! - Scheduler: Reclamation of workspaces that were never downloaded
//!
//! Each `POST /obfuscate` runs one job to completion before responding. The
//! resulting binary can be downloaded exactly once, after which the job's
//! workspace is gone.

mod api;
mod config;
mod process;
mod report;
mod scheduler;
mod service;
mod workspace;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::process::{LocalProcessRunner, ProcessRunner};
use crate::scheduler::WorkspaceSweeper;
use crate::service::job_service::JobService;
use crate::workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chakravyuha_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Chakravyuha Server...");

    let config = load_config()?;
    info!("Tool directory: {}", config.tool_dir.display());
    info!(
        "Obfuscator: {} {:?}",
        config.obfuscator.program.display(),
        config.obfuscator.args
    );
    info!(
        "Visualizer: {} {:?}",
        config.visualizer.program.display(),
        config.visualizer.args
    );
    info!(
        "Job timeout: {:?}, Workspace max age: {:?}, Max concurrent jobs: {}",
        config.job_timeout,
        config.workspace_max_age,
        config
            .max_concurrent_jobs
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );

    let workspaces = WorkspaceManager::init(config.scratch_root.clone())
        .await
        .context("Failed to prepare scratch root")?;

    let runner: Arc<dyn ProcessRunner> = Arc::new(LocalProcessRunner::new(config.job_timeout));
    let jobs = Arc::new(JobService::new(&config, workspaces.clone(), runner));

    let _sweeper_handle =
        WorkspaceSweeper::new(workspaces, config.sweep_interval, config.workspace_max_age).spawn();

    // Build router with all API endpoints
    let app = api::create_router(jobs, config.max_body_bytes);

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Loads configuration from environment variables
///
/// Unset variables take their defaults. A malformed one stops startup.
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid configuration in environment")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
